// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blattwerk: Page rasterisation backends.
//
// The traits in `traits` are the only surface the rest of the workspace
// sees. Which renderer sits behind them is decided at compile time.

use std::sync::Arc;

pub mod traits;

#[cfg(feature = "mupdf")]
pub mod mupdf;

#[cfg(not(feature = "mupdf"))]
pub mod stub;

pub use traits::{PageDocument, RasterBackend};

/// The renderer compiled into this build.
///
/// MuPDF when the `mupdf` feature is enabled, otherwise a stub that reports
/// `RenderUnavailable` on every open.
pub fn default_backend() -> Arc<dyn RasterBackend> {
    #[cfg(feature = "mupdf")]
    {
        Arc::new(mupdf::MupdfBackend)
    }
    #[cfg(not(feature = "mupdf"))]
    {
        Arc::new(stub::StubBackend)
    }
}
