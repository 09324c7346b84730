// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test fixtures: a synthetic raster backend and small PDFs built with lopdf.

use std::io::Write;
use std::path::Path;

use blattwerk_core::PageExtent;
use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_render::{PageDocument, RasterBackend};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use crate::image::encoder::{JpegRasterEncoder, RasterEncoder};

// -- Synthetic backend --------------------------------------------------------

/// Page size of every synthetic page: 72 × 100 px at 72 dpi.
const SYNTHETIC_EXTENT: PageExtent = PageExtent {
    width_pt: 72.0,
    height_pt: 100.0,
};

/// Renders pages without reading any file. Blank pages are pure white,
/// the rest carry dark "text" bands.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    blank: Vec<bool>,
    speckle: Option<(usize, f64)>,
    fail_at: Option<usize>,
}

impl SyntheticBackend {
    /// `pages` pages; the 0-based `blank` indices are white.
    pub fn with_blank_pages(pages: usize, blank: &[usize]) -> Self {
        Self {
            blank: (0..pages).map(|i| blank.contains(&i)).collect(),
            speckle: None,
            fail_at: None,
        }
    }

    /// Darken the top `fraction` of rows on page `index`.
    pub fn speckled(mut self, index: usize, fraction: f64) -> Self {
        self.speckle = Some((index, fraction));
        self
    }

    /// Make rasterising page `index` fail.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl RasterBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&self, _path: &Path) -> Result<Box<dyn PageDocument>> {
        Ok(Box::new(self.clone()))
    }
}

impl PageDocument for SyntheticBackend {
    fn page_count(&self) -> usize {
        self.blank.len()
    }

    fn page_extent(&self, index: usize) -> Result<PageExtent> {
        if index >= self.blank.len() {
            return Err(BlattwerkError::Render(format!("no page {index}")));
        }
        Ok(SYNTHETIC_EXTENT)
    }

    fn rasterize(&mut self, index: usize, dpi: u32) -> Result<RgbImage> {
        let extent = self.page_extent(index)?;
        if self.fail_at == Some(index) {
            return Err(BlattwerkError::Render(format!("page {index} failed to render")));
        }
        let (width, height) = extent.pixel_size(dpi);
        let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

        if !self.blank[index] {
            for y in (0..height).filter(|y| y % 4 < 2) {
                for x in 0..width {
                    img.put_pixel(x, y, Rgb([20, 20, 20]));
                }
            }
        }
        if let Some((page, fraction)) = self.speckle {
            if page == index {
                let rows = (height as f64 * fraction).round() as u32;
                for y in 0..rows.min(height) {
                    for x in 0..width {
                        img.put_pixel(x, y, Rgb([0, 0, 0]));
                    }
                }
            }
        }
        Ok(img)
    }
}

// -- lopdf fixtures -----------------------------------------------------------

fn page_tree(doc: &mut Document, contents: Vec<ObjectId>, resources: ObjectId) -> ObjectId {
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = contents
        .into_iter()
        .map(|content| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content,
            })
            .into()
        })
        .collect();
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog);
    catalog
}

fn font_resources(doc: &mut Document) -> ObjectId {
    let font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    doc.add_object(dictionary! { "Font" => dictionary! { "F1" => font } })
}

fn page_text(page: usize, lines: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for line in 0..lines {
        let y = 800 - (line as i64 * 14) % 780;
        out.extend_from_slice(
            format!("BT /F1 11 Tf 50 {y} Td (Page {page} line {line} lorem ipsum dolor) Tj ET\n")
                .as_bytes(),
        );
    }
    out
}

/// `pages` pages of uncompressed text content.
pub fn text_pdf(pages: usize) -> Document {
    let mut doc = Document::with_version("1.5");
    let resources = font_resources(&mut doc);
    let contents = (1..=pages)
        .map(|n| doc.add_object(Stream::new(dictionary! {}, page_text(n, 50))))
        .collect();
    page_tree(&mut doc, contents, resources);
    doc
}

pub fn text_pdf_bytes(pages: usize) -> Vec<u8> {
    save(text_pdf(pages))
}

/// Short text pages whose content is already deflated at the highest level.
pub fn minimal_text_pdf_bytes(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let resources = font_resources(&mut doc);
    let contents = (1..=pages)
        .map(|n| {
            doc.add_object(Stream::new(
                dictionary! { "Filter" => "FlateDecode" },
                zlib(&page_text(n, 2)),
            ))
        })
        .collect();
    page_tree(&mut doc, contents, resources);
    save(doc)
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// One page with `annotations` text notes, written the way PDF 1.5 writers
/// pack small documents: every dictionary inside one deflated object stream,
/// addressed through a cross-reference stream.
pub fn object_stream_pdf_bytes(annotations: usize) -> Vec<u8> {
    const CONTENT_ID: usize = 5;
    const FIRST_NOTE_ID: usize = 6;
    let objstm_id = FIRST_NOTE_ID + annotations;
    let xref_id = objstm_id + 1;

    let note_refs: Vec<String> = (0..annotations)
        .map(|i| format!("{} 0 R", FIRST_NOTE_ID + i))
        .collect();
    let mut packed: Vec<(usize, String)> = vec![
        (1, "<</Type/Catalog/Pages 2 0 R>>".to_string()),
        (2, "<</Type/Pages/Kids[3 0 R]/Count 1/MediaBox[0 0 595 842]>>".to_string()),
        (
            3,
            format!(
                "<</Type/Page/Parent 2 0 R/Resources<</Font<</F1 4 0 R>>>>/Contents {CONTENT_ID} 0 R/Annots[{}]>>",
                note_refs.join(" ")
            ),
        ),
        (4, "<</Type/Font/Subtype/Type1/BaseFont/Helvetica>>".to_string()),
    ];
    for i in 0..annotations {
        let x = 20 + (i % 25) * 22;
        let y = 60 + (i / 25) * 30;
        packed.push((
            FIRST_NOTE_ID + i,
            format!(
                "<</Type/Annot/Subtype/Text/Rect[{x} {y} {} {}]/Contents(Reviewer note {i}: see section two)/Open false>>",
                x + 18,
                y + 18
            ),
        ));
    }

    let mut index = String::new();
    let mut body = String::new();
    for (id, text) in &packed {
        index.push_str(&format!("{id} {} ", body.len()));
        body.push_str(text);
        body.push('\n');
    }
    let first = index.len();
    let objstm = zlib(format!("{index}{body}").as_bytes());

    let mut out = b"%PDF-1.5\n".to_vec();
    let mut offsets = vec![0usize; xref_id + 1];

    let content = b"BT /F1 12 Tf 72 760 Td (Reviewed copy) Tj ET";
    offsets[CONTENT_ID] = out.len();
    out.extend_from_slice(
        format!("{CONTENT_ID} 0 obj\n<</Length {}>>\nstream\n", content.len()).as_bytes(),
    );
    out.extend_from_slice(content);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    offsets[objstm_id] = out.len();
    out.extend_from_slice(
        format!(
            "{objstm_id} 0 obj\n<</Type/ObjStm/N {}/First {first}/Filter/FlateDecode/Length {}>>\nstream\n",
            packed.len(),
            objstm.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&objstm);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    // Rows of W [1 4 2]: type, offset or object stream number, generation or index.
    offsets[xref_id] = out.len();
    let mut rows = Vec::new();
    for id in 0..=xref_id {
        let (kind, second, third): (u8, u32, u16) = if id == 0 {
            (0, 0, 65535)
        } else if let Some(slot) = packed.iter().position(|(packed_id, _)| *packed_id == id) {
            (2, objstm_id as u32, slot as u16)
        } else {
            (1, offsets[id] as u32, 0)
        };
        rows.push(kind);
        rows.extend_from_slice(&second.to_be_bytes());
        rows.extend_from_slice(&third.to_be_bytes());
    }
    let rows = zlib(&rows);
    out.extend_from_slice(
        format!(
            "{xref_id} 0 obj\n<</Type/XRef/Size {}/W[1 4 2]/Root 1 0 R/Filter/FlateDecode/Length {}>>\nstream\n",
            xref_id + 1,
            rows.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&rows);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", offsets[xref_id]).as_bytes());
    out
}

/// Smooth gradient with mild texture, encoded as JPEG.
pub fn jpeg_bytes(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        let texture = ((x * 7 + y * 13) % 23) as u8;
        Rgb([
            ((x * 255) / width.max(1)) as u8 ^ texture,
            ((y * 255) / height.max(1)) as u8,
            (((x + y) * 127) / (width + height).max(1)) as u8 + texture,
        ])
    });
    JpegRasterEncoder
        .encode(&DynamicImage::ImageRgb8(img), quality)
        .unwrap()
}

/// One page showing one DCT image. Returns the document and the image's id.
pub fn image_pdf(width: u32, height: u32, quality: u8) -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg_bytes(width, height, quality),
    ));
    let resources = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im1" => image_id },
    });
    let content = doc.add_object(Stream::new(
        dictionary! {},
        b"q 500 0 0 320 40 400 cm /Im1 Do Q\n".to_vec(),
    ));
    page_tree(&mut doc, vec![content], resources);
    (doc, image_id)
}

pub fn image_pdf_bytes(width: u32, height: u32, quality: u8) -> Vec<u8> {
    save(image_pdf(width, height, quality).0)
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
