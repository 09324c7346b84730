// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blank page detection: rasterise each page at low resolution, sample its
// pixels and call it blank when nearly all of them are bright.

use std::path::Path;
use std::sync::Arc;

use blattwerk_core::EngineConfig;
use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_render::{RasterBackend, default_backend};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::jobs::{PageJob, PageOutput, PipelineOptions, dispatch};
use crate::pdf::PdfDocument;

/// Resolution pages are rendered at for blank detection.
pub const DEFAULT_SCAN_DPI: u32 = 72;

/// Thresholds for one blank-page scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlankSettings {
    /// Minimum fraction of bright samples for a blank page.
    pub threshold: f64,
    /// Every RGB channel must exceed this for a pixel to count as bright.
    pub brightness_cutoff: u8,
    /// Sample every n-th pixel in row-major order.
    pub sample_stride: usize,
}

impl Default for BlankSettings {
    fn default() -> Self {
        Self {
            threshold: 0.98,
            brightness_cutoff: 240,
            sample_stride: 10,
        }
    }
}

impl BlankSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            threshold: config.blank_threshold,
            brightness_cutoff: config.brightness_cutoff,
            sample_stride: config.sample_stride,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(BlattwerkError::InvalidArgument(format!(
                "blank threshold must lie in [0, 1], got {}",
                self.threshold
            )));
        }
        if self.sample_stride == 0 {
            return Err(BlattwerkError::InvalidArgument(
                "sample stride must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Fraction of sampled pixels that are bright, or `None` if nothing was
/// sampled.
pub fn whiteness(image: &RgbImage, brightness_cutoff: u8, sample_stride: usize) -> Option<f64> {
    let stride = sample_stride.max(1);
    let mut sampled = 0usize;
    let mut bright = 0usize;
    for pixel in image.pixels().step_by(stride) {
        sampled += 1;
        if pixel.0.iter().all(|&c| c > brightness_cutoff) {
            bright += 1;
        }
    }
    (sampled > 0).then(|| bright as f64 / sampled as f64)
}

/// `(blank, whiteness)` for one rendered page. Empty images are not blank.
pub fn measure_page(image: &RgbImage, settings: &BlankSettings) -> (bool, f64) {
    match whiteness(image, settings.brightness_cutoff, settings.sample_stride) {
        Some(ratio) => (ratio >= settings.threshold, ratio),
        None => (false, 0.0),
    }
}

/// Per-page scan result, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageScan {
    pub page: usize,
    pub whiteness: f64,
    pub blank: bool,
}

/// Outcome of [`BlankPageDetector::remove`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlankRemovalReport {
    pub total_pages: usize,
    /// 1-based numbers of the pages that were dropped.
    pub removed: Vec<usize>,
    pub kept: usize,
    /// Nothing was blank (or everything was) and the input was copied as is.
    pub copied_unchanged: bool,
}

/// Finds blank pages through the page scheduler.
pub struct BlankPageDetector {
    backend: Arc<dyn RasterBackend>,
    settings: BlankSettings,
    dpi: u32,
    options: PipelineOptions,
}

impl BlankPageDetector {
    pub fn new(backend: Arc<dyn RasterBackend>) -> Self {
        Self {
            backend,
            settings: BlankSettings::default(),
            dpi: DEFAULT_SCAN_DPI,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_settings(mut self, settings: BlankSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Whiteness and verdict for every page, in page order.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), threshold = self.settings.threshold))]
    pub fn scan_detailed(&self, path: impl AsRef<Path>) -> Result<Vec<PageScan>> {
        self.settings.validate()?;
        if self.dpi == 0 {
            return Err(BlattwerkError::InvalidArgument("scan dpi must be positive".into()));
        }
        let path = path.as_ref();
        let page_count = self.backend.open(path)?.page_count();
        if page_count == 0 {
            return Err(BlattwerkError::EmptyDocument(path.display().to_string()));
        }

        let job = PageJob::BlankScan {
            source: path.to_path_buf(),
            dpi: self.dpi,
            settings: self.settings,
        };
        let outputs = dispatch(job, page_count, Arc::clone(&self.backend), &self.options)?;

        outputs
            .into_iter()
            .enumerate()
            .map(|(index, output)| match output {
                PageOutput::Whiteness { blank, whiteness } => Ok(PageScan {
                    page: index + 1,
                    whiteness,
                    blank,
                }),
                other => Err(BlattwerkError::WorkerProtocol(format!(
                    "blank scan returned {other:?} for page {}",
                    index + 1
                ))),
            })
            .collect()
    }

    /// 1-based numbers of the blank pages, ascending.
    pub fn scan(&self, path: impl AsRef<Path>) -> Result<Vec<usize>> {
        let blanks: Vec<usize> = self
            .scan_detailed(path)?
            .into_iter()
            .filter(|scan| scan.blank)
            .map(|scan| scan.page)
            .collect();
        info!(blank = blanks.len(), "blank scan complete");
        Ok(blanks)
    }

    /// Write `input` to `output` without its blank pages.
    ///
    /// When no page is blank, or every page is, the input is copied
    /// unchanged.
    #[instrument(skip_all, fields(input = %input.as_ref().display(), output = %output.as_ref().display()))]
    pub fn remove(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<BlankRemovalReport> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let mut document = PdfDocument::open(input)?;
        let total_pages = document.page_count();
        let blanks = self.scan(input)?;

        if blanks.is_empty() || blanks.len() == total_pages {
            std::fs::copy(input, output)?;
            info!(blank = blanks.len(), total_pages, "nothing removed, copied input");
            return Ok(BlankRemovalReport {
                total_pages,
                removed: Vec::new(),
                kept: total_pages,
                copied_unchanged: true,
            });
        }

        let keep: Vec<usize> = (1..=total_pages).filter(|n| !blanks.contains(n)).collect();
        document.retain_pages(&keep)?;
        std::fs::write(output, document.to_bytes()?)?;
        info!(removed = blanks.len(), kept = keep.len(), "blank pages removed");

        Ok(BlankRemovalReport {
            total_pages,
            kept: keep.len(),
            removed: blanks,
            copied_unchanged: false,
        })
    }
}

/// 1-based numbers of the blank pages of `document_path`, using the default
/// renderer.
///
/// Pages are spread over one thread per core inside the calling process. Use
/// [`scan_blank_pages_with`] and [`PipelineOptions::processes`] to give each
/// chunk its own worker process instead.
pub fn scan_blank_pages(document_path: impl AsRef<Path>, threshold: f64) -> Result<Vec<usize>> {
    scan_blank_pages_with(document_path, threshold, PipelineOptions::default())
}

/// [`scan_blank_pages`] with explicit worker count and isolation.
pub fn scan_blank_pages_with(
    document_path: impl AsRef<Path>,
    threshold: f64,
    options: PipelineOptions,
) -> Result<Vec<usize>> {
    BlankPageDetector::new(default_backend())
        .with_settings(BlankSettings::default().with_threshold(threshold))
        .with_options(options)
        .scan(document_path)
}

/// Drop the blank pages of `input` into `output` with default settings.
pub fn remove_blank_pages(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<BlankRemovalReport> {
    BlankPageDetector::new(default_backend()).remove(input, output)
}
