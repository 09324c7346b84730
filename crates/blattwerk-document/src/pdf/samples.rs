// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sample document generation with `printpdf` 0.8: text, blank-page and
// image-heavy PDFs for trying out the compression and scanning commands.

use std::path::Path;

use blattwerk_core::error::{BlattwerkError, Result};
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    RawImageData, RawImageFormat, TextItem, XObjectTransform,
};
use tracing::{debug, info, instrument};

const FONT_SIZE_PT: f32 = 11.0;
const LINE_HEIGHT_PT: f32 = 14.0;
const MARGIN_MM: f32 = 20.0;

/// Builds small synthetic PDFs on A4 pages.
#[derive(Debug, Clone)]
pub struct SampleWriter {
    title: String,
    lines_per_page: usize,
}

impl Default for SampleWriter {
    fn default() -> Self {
        Self {
            title: "Blattwerk sample".into(),
            lines_per_page: 40,
        }
    }
}

impl SampleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_lines_per_page(mut self, lines: usize) -> Self {
        self.lines_per_page = lines.max(1);
        self
    }

    fn page_dimensions() -> (Mm, Mm) {
        (Mm(210.0), Mm(297.0))
    }

    // -- Documents ------------------------------------------------------------

    /// `pages` pages of numbered filler lines.
    #[instrument(skip(self))]
    pub fn text_document(&self, pages: usize) -> Result<Vec<u8>> {
        require_pages(pages)?;
        let pages = (1..=pages).map(|n| self.text_page(n)).collect();
        Ok(self.save(pages))
    }

    /// `total` pages where the 1-based `blank_positions` are left empty and
    /// every other page carries text.
    #[instrument(skip(self, blank_positions), fields(blanks = blank_positions.len()))]
    pub fn with_blank_pages(&self, total: usize, blank_positions: &[usize]) -> Result<Vec<u8>> {
        require_pages(total)?;
        if let Some(&bad) = blank_positions.iter().find(|&&n| n == 0 || n > total) {
            return Err(BlattwerkError::InvalidArgument(format!(
                "blank page {bad} is outside 1..={total}"
            )));
        }

        let (width, height) = Self::page_dimensions();
        let pages = (1..=total)
            .map(|n| {
                if blank_positions.contains(&n) {
                    PdfPage::new(width, height, Vec::new())
                } else {
                    self.text_page(n)
                }
            })
            .collect();
        Ok(self.save(pages))
    }

    /// `pages` pages, each filled with a `width` × `height` noise image.
    /// Noise barely compresses, so these documents are image-dominated.
    #[instrument(skip(self))]
    pub fn image_document(&self, pages: usize, width: u32, height: u32) -> Result<Vec<u8>> {
        require_pages(pages)?;
        if width == 0 || height == 0 {
            return Err(BlattwerkError::InvalidArgument(
                "sample image dimensions must be positive".into(),
            ));
        }

        let (page_w, page_h) = Self::page_dimensions();
        let mut doc = PdfDocument::new(&self.title);
        let mut out_pages = Vec::with_capacity(pages);

        for n in 0..pages {
            let raw = RawImage {
                pixels: RawImageData::U8(noise_pixels(width, height, n as u32 + 1)),
                width: width as usize,
                height: height as usize,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let id = doc.add_image(&raw);

            let margin_pt = Mm(MARGIN_MM).into_pt().0;
            let usable_w_pt = page_w.into_pt().0 - 2.0 * margin_pt;
            let dpi: f32 = 150.0;
            let native_w_pt = width as f32 / dpi * 72.0;
            let scale = (usable_w_pt / native_w_pt).min(1.0);

            let ops = vec![Op::UseXobject {
                id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(margin_pt)),
                    translate_y: Some(Pt(margin_pt)),
                    scale_x: Some(scale),
                    scale_y: Some(scale),
                    dpi: Some(dpi),
                    rotate: None,
                },
            }];
            out_pages.push(PdfPage::new(page_w, page_h, ops));
        }

        doc.with_pages(out_pages);
        Ok(finish(doc))
    }

    /// Write `bytes` to `path`, creating parent directories.
    pub fn write_to(bytes: &[u8], path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "sample written");
        Ok(())
    }

    // -- Internals ------------------------------------------------------------

    fn text_page(&self, number: usize) -> PdfPage {
        let (width, height) = Self::page_dimensions();
        let margin_pt = Mm(MARGIN_MM).into_pt().0;
        let top_pt = height.into_pt().0 - margin_pt;

        let mut ops = Vec::with_capacity(self.lines_per_page * 5);
        for line in 0..self.lines_per_page {
            let text = format!(
                "Page {number}, line {}: the quick brown fox jumps over the lazy dog.",
                line + 1
            );
            ops.push(Op::StartTextSection);
            ops.push(Op::SetTextCursor {
                pos: Point {
                    x: Pt(margin_pt),
                    y: Pt(top_pt - line as f32 * LINE_HEIGHT_PT),
                },
            });
            ops.push(Op::SetFontSizeBuiltinFont {
                size: Pt(FONT_SIZE_PT),
                font: BuiltinFont::Helvetica,
            });
            ops.push(Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(text)],
                font: BuiltinFont::Helvetica,
            });
            ops.push(Op::EndTextSection);
        }
        PdfPage::new(width, height, ops)
    }

    fn save(&self, pages: Vec<PdfPage>) -> Vec<u8> {
        let mut doc = PdfDocument::new(&self.title);
        doc.with_pages(pages);
        finish(doc)
    }
}

fn finish(doc: PdfDocument) -> Vec<u8> {
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    debug!(pages = doc.pages.len(), warnings = warnings.len(), bytes = bytes.len(), "sample built");
    bytes
}

fn require_pages(pages: usize) -> Result<()> {
    if pages == 0 {
        return Err(BlattwerkError::InvalidArgument(
            "a sample needs at least one page".into(),
        ));
    }
    Ok(())
}

/// Deterministic RGB noise; `seed` varies it per page.
fn noise_pixels(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E37_79B9) | 1;
    (0..width as usize * height as usize * 3)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::PdfDocument as Reader;

    #[test]
    fn text_document_has_requested_pages() {
        let bytes = SampleWriter::new().text_document(3).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(Reader::from_bytes(&bytes).unwrap().page_count(), 3);
    }

    #[test]
    fn blank_positions_are_validated() {
        let writer = SampleWriter::new();
        assert!(writer.with_blank_pages(3, &[0]).is_err());
        assert!(writer.with_blank_pages(3, &[4]).is_err());
        let bytes = writer.with_blank_pages(3, &[2]).unwrap();
        assert_eq!(Reader::from_bytes(&bytes).unwrap().page_count(), 3);
    }

    #[test]
    fn image_document_embeds_one_image_per_page() {
        let bytes = SampleWriter::new().image_document(2, 64, 48).unwrap();
        let doc = Reader::from_bytes(&bytes).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.image_count(), 2);
    }

    #[test]
    fn zero_pages_is_rejected() {
        assert!(SampleWriter::new().text_document(0).is_err());
        assert!(SampleWriter::new().image_document(1, 0, 10).is_err());
    }

    #[test]
    fn write_to_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/sample.pdf");
        SampleWriter::write_to(b"%PDF-1.7", &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
    }
}
