// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image resize-to-budget: optional exact resize, then the highest quality
// that fits a byte budget. Single files and whole directories.

use std::path::{Path, PathBuf};

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{ByteBudget, ChunkResult, RasterFormat, WorkChunk};
use blattwerk_pipeline::{ChunkWorker, PageWorkScheduler, run_indices};
use image::imageops::FilterType;
use image::{DynamicImage, ImageError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::encoder::{encoder_for, normalize_for};
use super::search::QualitySearch;

/// Quality used when an image is saved without a byte budget.
pub const DEFAULT_SAVE_QUALITY: u8 = 90;

/// Extensions picked up by [`batch_resize`] (compared case-insensitively).
const BATCH_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];

/// Encoded image plus what it took to get there.
#[derive(Debug, Clone)]
pub struct ResizeOutcome {
    pub bytes: Vec<u8>,
    /// `None` when even the lowest quality exceeded the budget; `bytes` then
    /// holds the floor-quality encoding.
    pub achieved_quality: Option<u8>,
    pub width: u32,
    pub height: u32,
}

/// What to do with each image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub target_bytes: Option<u64>,
    /// Exact output size in pixels; aspect ratio is not preserved.
    pub dimensions: Option<(u32, u32)>,
    pub format: RasterFormat,
}

impl ResizeRequest {
    pub fn new(format: RasterFormat) -> Self {
        Self {
            target_bytes: None,
            dimensions: None,
            format,
        }
    }
}

/// Summary of a directory run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub outputs: Vec<PathBuf>,
}

// -- Single image -------------------------------------------------------------

/// Decode `input`, optionally resize it to `dimensions`, and encode it as
/// `format` at the highest quality whose output is at most `target_bytes`.
///
/// An unreachable budget is not an error: the floor-quality bytes are
/// returned with `achieved_quality == None`.
#[instrument(skip(input), fields(input_len = input.len()))]
pub fn resize_raster_to_budget(
    input: &[u8],
    target_bytes: u64,
    dimensions: Option<(u32, u32)>,
    format: RasterFormat,
) -> Result<ResizeOutcome> {
    let budget = ByteBudget::new(target_bytes)?;
    let image = prepare(decode_image(input)?, dimensions, format)?;
    let (width, height) = (image.width(), image.height());

    let encoder = encoder_for(format);
    let outcome = QualitySearch::new(encoder.as_ref()).find_quality(&image, budget.bytes())?;

    match outcome.result.best_quality {
        Some(quality) => debug!(quality, bytes = outcome.bytes.len(), "budget met"),
        None => warn!(
            floor_bytes = outcome.result.best_bytes,
            target_bytes,
            "budget unreachable even at the lowest quality"
        ),
    }

    Ok(ResizeOutcome {
        bytes: outcome.bytes,
        achieved_quality: outcome.result.best_quality,
        width,
        height,
    })
}

/// File-to-file variant. Without a byte budget the image is saved once at
/// [`DEFAULT_SAVE_QUALITY`].
#[instrument(skip_all, fields(input = %input.as_ref().display(), output = %output.as_ref().display()))]
pub fn resize_image_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    request: &ResizeRequest,
) -> Result<ResizeOutcome> {
    let data = std::fs::read(input.as_ref())?;
    let original_bytes = data.len();

    let outcome = match request.target_bytes {
        Some(target) => resize_raster_to_budget(&data, target, request.dimensions, request.format)?,
        None => {
            let image = prepare(decode_image(&data)?, request.dimensions, request.format)?;
            let encoder = encoder_for(request.format);
            let quality = encoder.quality_range().clamp(DEFAULT_SAVE_QUALITY);
            ResizeOutcome {
                bytes: encoder.encode(&image, quality)?,
                achieved_quality: Some(quality),
                width: image.width(),
                height: image.height(),
            }
        }
    };

    std::fs::write(output.as_ref(), &outcome.bytes)?;
    info!(
        original_bytes,
        final_bytes = outcome.bytes.len(),
        width = outcome.width,
        height = outcome.height,
        "image written"
    );
    Ok(outcome)
}

/// Compress an image file toward `target_bytes`. PNG when transparency must
/// survive, JPEG otherwise.
pub fn compress_image_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    target_bytes: u64,
    preserve_transparency: bool,
) -> Result<ResizeOutcome> {
    let format = if preserve_transparency {
        RasterFormat::Png
    } else {
        RasterFormat::Jpeg
    };
    let request = ResizeRequest {
        target_bytes: Some(target_bytes),
        dimensions: None,
        format,
    };
    resize_image_file(input, output, &request)
}

// -- Directories --------------------------------------------------------------

struct ImageBatchWorker<'a> {
    files: &'a [PathBuf],
    output_dir: &'a Path,
    request: &'a ResizeRequest,
}

impl ChunkWorker for ImageBatchWorker<'_> {
    /// Written path, or `None` if this file failed.
    type Output = Option<PathBuf>;

    fn run_chunk(
        &self,
        chunk: &WorkChunk,
        progress: &dyn Fn(usize),
    ) -> Result<ChunkResult<Option<PathBuf>>> {
        run_indices(chunk, progress, |index| {
            let input = &self.files[index];
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("image_{index}"));
            let output = self
                .output_dir
                .join(format!("{stem}.{}", self.request.format.extension()));

            match resize_image_file(input, &output, self.request) {
                Ok(_) => Ok(Some(output)),
                Err(err) => {
                    warn!(path = %input.display(), error = %err, "skipping image");
                    Ok(None)
                }
            }
        })
    }
}

/// Apply `request` to every jpg/jpeg/png/bmp/gif file directly inside
/// `input_dir`, writing `<stem>.<ext>` into `output_dir` on `worker_count`
/// threads. Individual failures are counted, not fatal.
#[instrument(skip_all, fields(input_dir = %input_dir.as_ref().display(), worker_count = worker_count))]
pub fn batch_resize(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    request: &ResizeRequest,
    worker_count: usize,
) -> Result<BatchReport> {
    let files = find_images(input_dir.as_ref())?;
    if files.is_empty() {
        return Err(BlattwerkError::InvalidArgument(format!(
            "no images found in {}",
            input_dir.as_ref().display()
        )));
    }
    std::fs::create_dir_all(output_dir.as_ref())?;
    info!(files = files.len(), worker_count, "batch resize started");

    let worker = ImageBatchWorker {
        files: &files,
        output_dir: output_dir.as_ref(),
        request,
    };
    let results = PageWorkScheduler::new(worker_count).run(files.len(), &worker)?;

    let mut report = BatchReport::default();
    for written in results {
        match written {
            Some(path) => {
                report.processed += 1;
                report.outputs.push(path);
            }
            None => report.failed += 1,
        }
    }

    if report.failed == 0 {
        info!(processed = report.processed, "batch resize complete");
    } else {
        warn!(
            processed = report.processed,
            failed = report.failed,
            "batch resize complete with failures"
        );
    }
    Ok(report)
}

fn find_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| BATCH_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// -- Helpers ------------------------------------------------------------------

/// Decode encoded image bytes, classifying failures as input errors.
pub(crate) fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(data).map_err(|err| match err {
        ImageError::Unsupported(e) => BlattwerkError::UnsupportedFormat(e.to_string()),
        other => BlattwerkError::CorruptInput(format!("failed to decode image: {other}")),
    })
}

fn prepare(
    image: DynamicImage,
    dimensions: Option<(u32, u32)>,
    format: RasterFormat,
) -> Result<DynamicImage> {
    let image = match dimensions {
        Some((0, _)) | Some((_, 0)) => {
            return Err(BlattwerkError::InvalidArgument(
                "target dimensions must be non-zero".into(),
            ));
        }
        Some((width, height)) => {
            debug!(
                from_width = image.width(),
                from_height = image.height(),
                width,
                height,
                "resizing"
            );
            image.resize_exact(width, height, FilterType::Lanczos3)
        }
        None => image,
    };
    Ok(normalize_for(format, image))
}
