// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan module: page-level operations that need a renderer: blank page
// detection and removal, and page extraction to image files.

pub mod blank;
pub mod extract;

pub use blank::{
    BlankPageDetector, BlankRemovalReport, BlankSettings, PageScan, remove_blank_pages,
    scan_blank_pages, scan_blank_pages_with, whiteness,
};
pub use extract::{
    PageRasterExtractor, effective_dpi, extract_pages_as_images, extract_pages_as_images_with,
};
