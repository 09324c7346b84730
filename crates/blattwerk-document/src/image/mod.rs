// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: raster encoders, quality search and resize-to-budget.

pub mod encoder;
pub mod resize;
pub mod search;

pub use encoder::{JpegRasterEncoder, PngRasterEncoder, RasterEncoder, encoder_for, normalize_for};
pub use resize::{
    BatchReport, ResizeOutcome, ResizeRequest, batch_resize, compress_image_file,
    resize_image_file, resize_raster_to_budget,
};
pub use search::{QualitySearch, SearchOutcome, search_quality};
