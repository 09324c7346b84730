// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub backend for builds without a page renderer.
//
// Every open returns `RenderUnavailable`; the real renderer lives in the
// `mupdf` module behind the feature of the same name.

use std::path::Path;

use blattwerk_core::error::{BlattwerkError, Result};

use crate::traits::*;

/// Renderer returned when no real backend is compiled in.
pub struct StubBackend;

impl RasterBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PageDocument>> {
        tracing::warn!(path = %path.display(), "RasterBackend::open called on stub backend");
        Err(BlattwerkError::RenderUnavailable(
            "this build has no page renderer; rebuild with the \"mupdf\" feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reports_render_unavailable() {
        let backend = StubBackend;
        assert_eq!(backend.name(), "stub");
        assert!(matches!(
            backend.open(Path::new("anything.pdf")),
            Err(BlattwerkError::RenderUnavailable(_))
        ));
    }

    #[test]
    fn default_backend_is_stub_without_feature() {
        assert_eq!(crate::default_backend().name(), "stub");
    }
}
