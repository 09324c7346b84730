// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serialisation with stream re-deflation, object pruning and renumbering.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use blattwerk_core::MAX_DEFLATE_LEVEL;
use blattwerk_core::error::{BlattwerkError, Result};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use lopdf::{Document, Object, ObjectId, Stream};
use tracing::{debug, instrument};

use super::reader::{PdfDocument, is_image, strip_metadata_in};

const FONT_FILE_KEYS: &[&[u8]] = &[b"FontFile", b"FontFile2", b"FontFile3"];

/// What [`PdfDocument::persist`] does to the copy it writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// zlib level, clamped to 1..=9.
    pub deflate_level: u32,
    pub recompress_images: bool,
    pub recompress_fonts: bool,
    pub strip_metadata: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            deflate_level: 6,
            recompress_images: true,
            recompress_fonts: true,
            strip_metadata: false,
        }
    }
}

/// Counts from one re-deflation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DeflateStats {
    examined: usize,
    shrunk: usize,
}

impl PdfDocument {
    /// Serialise an optimised copy, leaving `self` untouched.
    ///
    /// Unfiltered and Flate-only streams are re-deflated at
    /// `options.deflate_level` and replaced only when the result is smaller.
    /// Unreferenced objects are dropped and the rest renumbered.
    #[instrument(skip_all, fields(deflate_level = options.deflate_level))]
    pub fn persist(&self, options: &SaveOptions) -> Result<Vec<u8>> {
        let mut copy = self.inner().clone();
        if options.strip_metadata {
            strip_metadata_in(&mut copy);
        }

        let level = options.deflate_level.clamp(1, MAX_DEFLATE_LEVEL);
        let stats = redeflate_streams(&mut copy, level, options);
        copy.prune_objects();
        copy.renumber_objects();

        let mut out = Vec::new();
        copy.save_to(&mut out)
            .map_err(|err| BlattwerkError::PdfError(format!("failed to serialise PDF: {err}")))?;
        debug!(
            examined = stats.examined,
            shrunk = stats.shrunk,
            bytes = out.len(),
            "PDF persisted"
        );
        Ok(out)
    }
}

fn redeflate_streams(document: &mut Document, level: u32, options: &SaveOptions) -> DeflateStats {
    let fonts = font_stream_ids(document);
    let mut stats = DeflateStats::default();

    for (id, object) in document.objects.iter_mut() {
        let Object::Stream(stream) = object else {
            continue;
        };
        if is_structural(stream) {
            continue;
        }
        if is_image(&stream.dict) && !options.recompress_images {
            continue;
        }
        if fonts.contains(id) && !options.recompress_fonts {
            continue;
        }
        stats.examined += 1;
        if redeflate(stream, level) {
            stats.shrunk += 1;
        }
    }
    stats
}

/// Re-deflate one stream. Returns whether its content was replaced.
fn redeflate(stream: &mut Stream, level: u32) -> bool {
    let raw = match stream_filter(stream) {
        StreamFilter::None => stream.content.clone(),
        StreamFilter::Flate => match inflate(&stream.content) {
            Some(raw) => raw,
            None => return false,
        },
        StreamFilter::Other => return false,
    };
    let Some(packed) = deflate(&raw, level) else {
        return false;
    };
    if packed.len() >= stream.content.len() {
        return false;
    }
    stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    stream.set_content(packed);
    true
}

enum StreamFilter {
    None,
    Flate,
    Other,
}

fn stream_filter(stream: &Stream) -> StreamFilter {
    match stream.dict.get(b"Filter") {
        Err(_) => StreamFilter::None,
        Ok(Object::Name(name)) if name == b"FlateDecode" => StreamFilter::Flate,
        Ok(Object::Array(filters)) if filters.is_empty() => StreamFilter::None,
        Ok(Object::Array(filters)) => match filters.as_slice() {
            [Object::Name(name)] if name == b"FlateDecode" => StreamFilter::Flate,
            _ => StreamFilter::Other,
        },
        Ok(_) => StreamFilter::Other,
    }
}

/// Cross-reference and object streams are rebuilt by the writer.
fn is_structural(stream: &Stream) -> bool {
    matches!(
        stream.dict.get(b"Type").and_then(Object::as_name),
        Ok(b"XRef") | Ok(b"ObjStm")
    )
}

fn font_stream_ids(document: &Document) -> BTreeSet<ObjectId> {
    let mut ids = BTreeSet::new();
    for object in document.objects.values() {
        let dict = match object {
            Object::Dictionary(dict) => dict,
            Object::Stream(stream) => &stream.dict,
            _ => continue,
        };
        for key in FONT_FILE_KEYS {
            if let Ok(id) = dict.get(key).and_then(Object::as_reference) {
                ids.insert(id);
            }
        }
    }
    ids
}

fn inflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out).ok()?;
    Some(out)
}

fn deflate(data: &[u8], level: u32) -> Option<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data).ok()?;
    encoder.finish().ok()
}

#[cfg(test)]
mod tests {
    use lopdf::dictionary;

    use super::*;
    use crate::test_support::{text_pdf, text_pdf_bytes};

    fn repetitive(len: usize) -> Vec<u8> {
        b"BT /F1 12 Tf 72 720 Td (hello world) Tj ET\n"
            .iter()
            .copied()
            .cycle()
            .take(len)
            .collect()
    }

    #[test]
    fn unfiltered_streams_get_deflated() {
        let mut stream = Stream::new(dictionary! {}, repetitive(4096));
        assert!(redeflate(&mut stream, 9));
        assert!(stream.content.len() < 4096);
        assert_eq!(inflate(&stream.content).unwrap(), repetitive(4096));
        assert_eq!(
            stream.dict.get(b"Length").unwrap().as_i64().unwrap(),
            stream.content.len() as i64
        );
    }

    #[test]
    fn weakly_deflated_streams_shrink() {
        let raw = repetitive(16_384);
        let weak = deflate(&raw, 1).unwrap();
        let mut stream = Stream::new(dictionary! { "Filter" => "FlateDecode" }, weak.clone());
        redeflate(&mut stream, 9);
        assert!(stream.content.len() <= weak.len());
        assert_eq!(inflate(&stream.content).unwrap(), raw);
    }

    #[test]
    fn other_filters_are_left_alone() {
        let content = vec![0xFF, 0xD8, 0x00, 0x00, 0xFF, 0xD9];
        let mut stream = Stream::new(dictionary! { "Filter" => "DCTDecode" }, content.clone());
        assert!(!redeflate(&mut stream, 9));
        assert_eq!(stream.content, content);
    }

    #[test]
    fn incompressible_content_is_kept() {
        let mut stream = Stream::new(dictionary! {}, vec![1, 2, 3]);
        assert!(!redeflate(&mut stream, 9));
        assert_eq!(stream.content, vec![1, 2, 3]);
        assert!(!stream.dict.has(b"Filter"));
    }

    #[test]
    fn persist_round_trips_and_leaves_source_alone() {
        let doc = PdfDocument::from_bytes(&text_pdf_bytes(3)).unwrap();
        let before = doc.inner().objects.len();
        let bytes = doc.persist(&SaveOptions::default()).unwrap();

        assert_eq!(doc.inner().objects.len(), before);
        let reopened = PdfDocument::from_bytes(&bytes).unwrap();
        assert_eq!(reopened.page_count(), 3);
    }

    #[test]
    fn persist_drops_unreferenced_objects() {
        let mut raw = text_pdf(1);
        let noise: Vec<u8> = (0u32..50_000)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        raw.add_object(Stream::new(dictionary! {}, noise));
        let doc = PdfDocument::from_document(raw, 0).unwrap();
        let bytes = doc.persist(&SaveOptions::default()).unwrap();
        assert!(bytes.len() < 10_000, "orphan survived: {} bytes", bytes.len());
    }

    #[test]
    fn persist_can_strip_metadata() {
        let mut raw = text_pdf(1);
        let info = raw.add_object(dictionary! { "Title" => Object::string_literal("secret") });
        raw.trailer.set("Info", info);
        let doc = PdfDocument::from_document(raw, 0).unwrap();

        let options = SaveOptions {
            strip_metadata: true,
            ..SaveOptions::default()
        };
        let reopened = PdfDocument::from_bytes(&doc.persist(&options).unwrap()).unwrap();
        assert!(!reopened.inner().trailer.has(b"Info"));
        assert!(doc.inner().trailer.has(b"Info"));
    }

    #[test]
    fn font_files_can_be_excluded() {
        let mut raw = text_pdf(1);
        let font_file = raw.add_object(Stream::new(dictionary! {}, repetitive(8192)));
        raw.add_object(dictionary! { "Type" => "FontDescriptor", "FontFile2" => font_file });
        let ids = font_stream_ids(&raw);
        assert!(ids.contains(&font_file));
    }
}
