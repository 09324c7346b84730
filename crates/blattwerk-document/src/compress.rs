// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Size-targeted document compression: strip, recompress images, then
// re-deflate at rising levels until the output fits the budget or the
// attempts run out. Never returns something larger than the input.

use std::path::Path;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{
    ByteBudget, CompressionAttempt, CompressionReport, DEFAULT_TOLERANCE, EngineConfig,
    Feasibility, FeasibilityVerdict, MAX_DEFLATE_LEVEL, QualityPreset, reduction_pct,
};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::pdf::{PdfDocument, SaveOptions};

/// Default number of persist-and-measure passes.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Drives a document toward a byte budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeTargetController {
    max_iterations: u32,
    tolerance: f64,
}

impl Default for SizeTargetController {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl SizeTargetController {
    pub fn new(max_iterations: u32, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_iterations, config.tolerance)
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Compress the PDF at `input` into `output`.
    ///
    /// Input problems (missing, corrupt, encrypted or empty documents, a zero
    /// budget) are reported before anything is written. Missing the budget is
    /// not an error: the report says so through `met_target`.
    #[instrument(skip_all, fields(
        input = %input.as_ref().display(),
        output = %output.as_ref().display(),
        target_bytes = target_bytes,
        preset = %preset,
    ))]
    pub fn compress_to_budget(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        target_bytes: u64,
        preset: QualityPreset,
    ) -> Result<CompressionReport> {
        let data = read_input(input.as_ref())?;
        let (bytes, report) = self.compress_bytes(&data, target_bytes, preset)?;
        std::fs::write(output.as_ref(), &bytes)?;
        info!(
            original = report.original_bytes,
            compressed = report.final_bytes,
            reduction_pct = format!("{:.1}", report.reduction_pct),
            met_target = report.met_target,
            "compression complete"
        );
        Ok(report)
    }

    /// In-memory form of [`SizeTargetController::compress_to_budget`].
    pub fn compress_bytes(
        &self,
        data: &[u8],
        target_bytes: u64,
        preset: QualityPreset,
    ) -> Result<(Vec<u8>, CompressionReport)> {
        if self.max_iterations == 0 {
            return Err(BlattwerkError::InvalidArgument(
                "max_iterations must be at least 1".into(),
            ));
        }
        let budget = ByteBudget::with_tolerance(target_bytes, self.tolerance)?;
        let mut document = PdfDocument::from_bytes(data)?;
        let original_bytes = data.len() as u64;
        let settings = preset.settings();

        document.strip_metadata();
        let images_recompressed = if budget.fits_with_tolerance(original_bytes) {
            info!(original_bytes, "already within budget, images left as they are");
            0
        } else {
            let ratio = budget.bytes() as f64 / original_bytes.max(1) as f64;
            document.recompress_images(&settings, ratio)?
        };

        let mut attempts = Vec::new();
        let mut best: Option<Vec<u8>> = None;
        let mut last_level = None;

        for attempt in 0..self.max_iterations {
            let deflate_level = (settings.deflate_level + attempt).min(MAX_DEFLATE_LEVEL);
            if last_level == Some(deflate_level) {
                debug!(deflate_level, "deflate level saturated");
                break;
            }
            last_level = Some(deflate_level);

            let candidate = document.persist(&SaveOptions {
                deflate_level,
                recompress_images: true,
                recompress_fonts: true,
                strip_metadata: false,
            })?;
            let resulting_bytes = candidate.len() as u64;
            attempts.push(CompressionAttempt {
                attempt_number: attempt + 1,
                deflate_level,
                resulting_bytes,
            });
            debug!(attempt = attempt + 1, deflate_level, resulting_bytes, "attempt");

            if best.as_ref().is_none_or(|b| candidate.len() < b.len()) {
                best = Some(candidate);
            }
            if budget.fits_with_tolerance(resulting_bytes) {
                break;
            }
        }

        let compressed = best.ok_or_else(|| {
            BlattwerkError::PdfError("no compression attempt produced output".into())
        })?;

        let fell_back_to_original = compressed.len() as u64 > original_bytes;
        let output = if fell_back_to_original {
            warn!(
                original_bytes,
                compressed_bytes = compressed.len(),
                "compression grew the file, keeping the original"
            );
            data.to_vec()
        } else {
            compressed
        };

        let final_bytes = output.len() as u64;
        let met_target = budget.fits_with_tolerance(final_bytes);
        if !met_target {
            warn!(
                final_bytes,
                target_bytes,
                "target not met; a lower quality preset may get closer"
            );
        }

        let report = CompressionReport {
            original_bytes,
            final_bytes,
            target_bytes,
            reduction_pct: reduction_pct(original_bytes, final_bytes),
            met_target,
            fell_back_to_original,
            images_recompressed,
            attempts,
            completed_at: Utc::now(),
        };
        Ok((output, report))
    }
}

/// [`SizeTargetController::compress_to_budget`] with default iterations and
/// tolerance.
pub fn compress_to_budget(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    target_bytes: u64,
    preset: QualityPreset,
) -> Result<CompressionReport> {
    SizeTargetController::default().compress_to_budget(input, output, target_bytes, preset)
}

// -- Feasibility --------------------------------------------------------------

/// Estimate whether `input` can plausibly be compressed to `target_bytes`.
#[instrument(skip_all, fields(input = %input.as_ref().display(), target_bytes = target_bytes))]
pub fn estimate_feasibility(input: impl AsRef<Path>, target_bytes: u64) -> Result<Feasibility> {
    ByteBudget::new(target_bytes)?;
    let data = read_input(input.as_ref())?;
    let document = PdfDocument::from_bytes(&data)?;
    let feasibility = classify(
        data.len() as u64,
        target_bytes,
        document.page_count(),
        document.image_count(),
    );
    info!(verdict = ?feasibility.verdict, "feasibility estimated");
    Ok(feasibility)
}

/// Heuristic verdict from sizes and counts alone.
pub fn classify(
    current_bytes: u64,
    target_bytes: u64,
    page_count: usize,
    image_count: usize,
) -> Feasibility {
    let required = reduction_pct(current_bytes, target_bytes);
    let verdict = if current_bytes <= target_bytes {
        FeasibilityVerdict::AlreadyUnderTarget
    } else if image_count == 0 && required > 30.0 {
        FeasibilityVerdict::TextOnlyDifficult
    } else if image_count > 0 && required <= 70.0 {
        FeasibilityVerdict::ImageHeavyFeasible
    } else if required > 90.0 {
        FeasibilityVerdict::LikelyUnachievable
    } else {
        FeasibilityVerdict::Feasible
    };

    Feasibility {
        verdict,
        current_bytes,
        target_bytes,
        required_reduction_pct: required,
        page_count,
        image_count,
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            BlattwerkError::CorruptInput(format!("{} does not exist", path.display()))
        } else {
            BlattwerkError::Io(err)
        }
    })
}
