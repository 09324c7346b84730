// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// MuPDF-backed page renderer.

use std::path::Path;

use blattwerk_core::PageExtent;
use blattwerk_core::error::{BlattwerkError, Result};
use image::RgbImage;
use mupdf::{Colorspace, Matrix};
use tracing::{debug, instrument};

use crate::traits::*;

/// Renders pages through the MuPDF C library.
pub struct MupdfBackend;

impl RasterBackend for MupdfBackend {
    fn name(&self) -> &str {
        "mupdf"
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn open(&self, path: &Path) -> Result<Box<dyn PageDocument>> {
        let path_str = path.to_str().ok_or_else(|| {
            BlattwerkError::InvalidArgument(format!("path is not valid UTF-8: {}", path.display()))
        })?;
        let doc = mupdf::Document::open(path_str)
            .map_err(|e| BlattwerkError::CorruptInput(format!("{}: {e}", path.display())))?;

        if doc.needs_password().map_err(render_err)? {
            return Err(BlattwerkError::EncryptedDocument(path.display().to_string()));
        }

        let page_count = doc.page_count().map_err(render_err)?.max(0) as usize;
        debug!(page_count, "opened document with MuPDF");

        Ok(Box::new(MupdfDocument { doc, page_count }))
    }
}

/// One open MuPDF document. Not shared between threads.
pub struct MupdfDocument {
    doc: mupdf::Document,
    page_count: usize,
}

impl MupdfDocument {
    fn load_page(&self, index: usize) -> Result<mupdf::Page> {
        if index >= self.page_count {
            return Err(BlattwerkError::InvalidArgument(format!(
                "page index {index} out of range (document has {} pages)",
                self.page_count
            )));
        }
        self.doc.load_page(index as i32).map_err(render_err)
    }
}

impl PageDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_extent(&self, index: usize) -> Result<PageExtent> {
        let bounds = self.load_page(index)?.bounds().map_err(render_err)?;
        Ok(PageExtent {
            width_pt: bounds.x1 - bounds.x0,
            height_pt: bounds.y1 - bounds.y0,
        })
    }

    fn rasterize(&mut self, index: usize, dpi: u32) -> Result<RgbImage> {
        let page = self.load_page(index)?;
        let scale = dpi as f32 / 72.0;
        let matrix = Matrix::new_scale(scale, scale);
        let pixmap = page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)
            .map_err(render_err)?;

        let width = pixmap.width() as u32;
        let height = pixmap.height() as u32;
        let n = pixmap.n() as usize;
        let samples = pixmap.samples();

        // DeviceRGB without alpha gives n == 3; anything else is repacked.
        let rgb = if n == 3 {
            samples.to_vec()
        } else {
            let mut buffer = Vec::with_capacity(width as usize * height as usize * 3);
            for pixel in samples.chunks_exact(n.max(1)) {
                let r = pixel.first().copied().unwrap_or(0);
                let g = pixel.get(1).copied().unwrap_or(r);
                let b = pixel.get(2).copied().unwrap_or(r);
                buffer.extend_from_slice(&[r, g, b]);
            }
            buffer
        };

        RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
            BlattwerkError::Render(format!(
                "pixmap for page {index} does not match {width}x{height} RGB"
            ))
        })
    }
}

fn render_err(err: mupdf::Error) -> BlattwerkError {
    BlattwerkError::Render(err.to_string())
}
