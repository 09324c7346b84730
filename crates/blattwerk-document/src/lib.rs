// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// blattwerk-document: Size-targeted compression for PDFs and images.
//
// Provides budgeted image encoding (quality search, resize-to-budget, batch
// directories), iterative PDF compression with a non-regression guard, and
// the page pipeline operations built on a raster backend (blank page
// detection and removal, page extraction).

pub mod compress;
pub mod image;
pub mod jobs;
pub mod pdf;
pub mod scan;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export the primary entry points so callers can use
// `blattwerk_document::compress_to_budget` etc.
pub use compress::{SizeTargetController, compress_to_budget, estimate_feasibility};
pub use image::{
    BatchReport, QualitySearch, RasterEncoder, ResizeOutcome, ResizeRequest, batch_resize,
    compress_image_file, resize_image_file, resize_raster_to_budget,
};
pub use jobs::{Isolation, LocalPageWorker, PageJob, PageOutput, PipelineOptions, serve_stdio};
pub use pdf::{PdfDocument, SampleWriter, SaveOptions};
pub use scan::{
    BlankPageDetector, BlankRemovalReport, BlankSettings, PageRasterExtractor,
    extract_pages_as_images, extract_pages_as_images_with, remove_blank_pages, scan_blank_pages,
    scan_blank_pages_with,
};
