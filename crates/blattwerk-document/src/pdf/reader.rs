// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open, validate and inspect existing PDF documents with `lopdf`,
// plus the structural edits compression and blank removal need.

use std::path::Path;

use blattwerk_core::PageExtent;
use blattwerk_core::error::{BlattwerkError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info, instrument};

/// How far up the page tree inherited attributes are looked for.
const MAX_TREE_DEPTH: usize = 32;

/// Keys removed from every page by [`PdfDocument::strip_metadata`].
const PAGE_AUXILIARY_KEYS: &[&[u8]] = &[b"Thumb", b"PieceInfo"];

/// An opened, validated PDF.
///
/// Construction fails on unreadable, encrypted or page-less input, so every
/// `PdfDocument` has at least one page and can be rewritten.
pub struct PdfDocument {
    document: Document,
    source_len: u64,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("pages", &self.page_count())
            .field("source_len", &self.source_len)
            .finish()
    }
}

impl PdfDocument {
    // -- Construction ---------------------------------------------------------

    /// Open and validate a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                BlattwerkError::CorruptInput(format!("{} does not exist", path.display()))
            } else {
                BlattwerkError::Io(err)
            }
        })?;
        let document = Self::from_bytes(&data)?;
        info!(pages = document.page_count(), bytes = data.len(), "PDF opened");
        Ok(document)
    }

    /// Load a PDF already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            if contains(data, b"/Encrypt") {
                BlattwerkError::EncryptedDocument(format!("{} byte document: {err}", data.len()))
            } else {
                BlattwerkError::CorruptInput(format!("not a readable PDF: {err}"))
            }
        })?;
        Self::from_document(document, data.len() as u64)
    }

    /// Wrap an in-memory `lopdf` document, applying the same checks as
    /// [`PdfDocument::open`].
    pub fn from_document(document: Document, source_len: u64) -> Result<Self> {
        if document.trailer.has(b"Encrypt") {
            return Err(BlattwerkError::EncryptedDocument(format!(
                "{source_len} byte document has an /Encrypt dictionary"
            )));
        }
        if document.get_pages().is_empty() {
            return Err(BlattwerkError::EmptyDocument(format!(
                "{source_len} byte document has an empty page tree"
            )));
        }
        debug!(pages = document.get_pages().len(), source_len, "PDF validated");
        Ok(Self {
            document,
            source_len,
        })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Size of the bytes this document was loaded from.
    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    pub fn inner(&self) -> &Document {
        &self.document
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Media box of the page at 0-based `index`, following inheritance up the
    /// page tree. Pages without a usable media box are treated as US Letter.
    pub fn page_extent(&self, index: usize) -> Result<PageExtent> {
        let page_id = self.page_id(index)?;
        let mut current = self.document.get_dictionary(page_id).ok();

        for _ in 0..MAX_TREE_DEPTH {
            let Some(dict) = current else { break };
            if let Some(extent) = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| media_box_extent(&self.document, obj))
            {
                return Ok(extent);
            }
            current = dict
                .get(b"Parent")
                .and_then(Object::as_reference)
                .and_then(|id| self.document.get_dictionary(id))
                .ok();
        }
        Ok(PageExtent::LETTER)
    }

    /// Number of image XObjects anywhere in the file.
    pub fn image_count(&self) -> usize {
        self.document
            .objects
            .values()
            .filter(|object| match object {
                Object::Stream(stream) => is_image(&stream.dict),
                _ => false,
            })
            .count()
    }

    fn page_id(&self, index: usize) -> Result<ObjectId> {
        let pages = self.document.get_pages();
        pages
            .values()
            .nth(index)
            .copied()
            .ok_or_else(|| {
                BlattwerkError::InvalidArgument(format!(
                    "page {} out of range (document has {} pages)",
                    index + 1,
                    pages.len()
                ))
            })
    }

    // -- Structural edits -----------------------------------------------------

    /// Drop the document information dictionary, the catalog's XMP metadata
    /// stream, and per-page thumbnails and application data.
    pub fn strip_metadata(&mut self) {
        strip_metadata_in(&mut self.document);
    }

    /// Keep only the pages whose 1-based numbers are in `keep`, then drop
    /// objects nothing refers to any more.
    #[instrument(skip_all, fields(keep = keep.len()))]
    pub fn retain_pages(&mut self, keep: &[usize]) -> Result<()> {
        let total = self.page_count();
        if keep.is_empty() {
            return Err(BlattwerkError::InvalidArgument(
                "cannot remove every page of a document".into(),
            ));
        }
        if let Some(&bad) = keep.iter().find(|&&n| n == 0 || n > total) {
            return Err(BlattwerkError::InvalidArgument(format!(
                "page {bad} out of range (document has {total} pages)"
            )));
        }

        let doomed: Vec<u32> = (1..=total)
            .filter(|n| !keep.contains(n))
            .map(|n| n as u32)
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }
        self.document.delete_pages(&doomed);
        let pruned = self.document.prune_objects();
        debug!(removed_pages = doomed.len(), pruned = pruned.len(), "pages removed");
        Ok(())
    }

    /// Serialise the document as it stands, without further optimisation.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.document
            .save_to(&mut out)
            .map_err(|err| BlattwerkError::PdfError(format!("failed to serialise PDF: {err}")))?;
        Ok(out)
    }
}

// -- Helpers ------------------------------------------------------------------

pub(crate) fn strip_metadata_in(document: &mut Document) {
    document.trailer.remove(b"Info");

    let root = document.trailer.get(b"Root").and_then(Object::as_reference).ok();
    if let Some(catalog) = root.and_then(|id| document.get_dictionary_mut(id).ok()) {
        catalog.remove(b"Metadata");
    }

    let page_ids: Vec<ObjectId> = document.get_pages().values().copied().collect();
    for id in page_ids {
        if let Ok(page) = document.get_dictionary_mut(id) {
            for key in PAGE_AUXILIARY_KEYS {
                page.remove(key);
            }
        }
    }
}

pub(crate) fn is_image(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype").and_then(Object::as_name), Ok(b"Image"))
}

fn media_box_extent(document: &Document, object: &Object) -> Option<PageExtent> {
    let array = resolve(document, object).as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut values = [0f32; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = number(resolve(document, item))?;
    }
    let width = (values[2] - values[0]).abs();
    let height = (values[3] - values[1]).abs();
    (width > 0.0 && height > 0.0).then_some(PageExtent {
        width_pt: width,
        height_pt: height,
    })
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f as f32),
        _ => None,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
