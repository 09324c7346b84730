// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Renderer-agnostic trait definitions for turning document pages into pixels.

use std::path::Path;

use blattwerk_core::PageExtent;
use blattwerk_core::error::Result;
use image::RgbImage;

/// A page renderer that can open documents from disk.
///
/// Backends are shared between worker threads; the documents they open are
/// not. Every worker opens its own [`PageDocument`].
pub trait RasterBackend: Send + Sync {
    /// Short backend name for logs (e.g. "mupdf").
    fn name(&self) -> &str;

    /// Open a document read-only.
    ///
    /// Unreadable files map to `CorruptInput`; a build without a renderer
    /// returns `RenderUnavailable`.
    fn open(&self, path: &Path) -> Result<Box<dyn PageDocument>>;
}

/// An open, read-only document handle owned by exactly one worker.
pub trait PageDocument {
    fn page_count(&self) -> usize;

    /// Page size in points, after any page-box inheritance.
    fn page_extent(&self, index: usize) -> Result<PageExtent>;

    /// Render page `index` (0-based) at `dpi` into an 8-bit RGB buffer.
    fn rasterize(&mut self, index: usize, dpi: u32) -> Result<RgbImage>;
}
