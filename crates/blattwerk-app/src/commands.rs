// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command implementations. Each one calls into blattwerk-document and
// prints either a short human summary or the JSON report.

use std::path::{Path, PathBuf};

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::size::{format_size, parse_size};
use blattwerk_core::{EngineConfig, IsolationMode, QualityPreset, RasterFormat};
use blattwerk_document::{
    BlankPageDetector, BlankSettings, PageRasterExtractor, PipelineOptions, ResizeRequest,
    SampleWriter, SizeTargetController, batch_resize, compress_image_file, estimate_feasibility,
    resize_image_file,
};
use blattwerk_pipeline::default_worker_count;
use blattwerk_render::default_backend;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

/// Settings shared by every command of one invocation.
#[derive(Debug, Clone)]
pub struct Session {
    config: EngineConfig,
    json: bool,
}

impl Session {
    /// Defaults, overlaid with the config file, overlaid with flags.
    pub fn load(
        config_path: Option<&Path>,
        workers: Option<usize>,
        threads: bool,
        json: bool,
    ) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        if workers.is_some() {
            config.worker_count = workers;
        }
        if threads {
            config.isolation = IsolationMode::Thread;
        }
        config.validate()?;
        debug!(?config, "session configured");
        Ok(Self { config, json })
    }

    fn pipeline(&self) -> Result<PipelineOptions> {
        PipelineOptions::from_config(&self.config)
    }

    fn emit<T: Serialize>(&self, report: &T, summary: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
        } else {
            println!("{}", summary());
        }
        Ok(())
    }

    // -- PDF compression ------------------------------------------------------

    pub fn compress(
        &self,
        input: &Path,
        output: Option<PathBuf>,
        target_size: &str,
        preset: QualityPreset,
    ) -> Result<()> {
        let target = parse_size(target_size)?;
        let output = output.unwrap_or_else(|| sibling(input, "compressed", "pdf"));
        info!(target = %format_size(target), %preset, "compressing");

        let report = SizeTargetController::from_config(&self.config)
            .compress_to_budget(input, &output, target, preset)?;

        self.emit(&report, || {
            let mut line = format!(
                "{} -> {}: {} -> {} ({:.1}% smaller)",
                input.display(),
                output.display(),
                format_size(report.original_bytes),
                format_size(report.final_bytes),
                report.reduction_pct
            );
            if report.fell_back_to_original {
                line.push_str("\nCompression did not help; the original was copied unchanged.");
            }
            if !report.met_target {
                line.push_str(&format!(
                    "\nTarget {} not reached. Try --quality low.",
                    format_size(report.target_bytes)
                ));
            }
            line
        })
    }

    pub fn feasibility(&self, input: &Path, target_size: &str) -> Result<()> {
        let target = parse_size(target_size)?;
        let estimate = estimate_feasibility(input, target)?;
        self.emit(&estimate, || {
            format!(
                "{}: {:?} ({} -> {}, {:.0}% reduction needed, {} pages, {} images)",
                input.display(),
                estimate.verdict,
                format_size(estimate.current_bytes),
                format_size(estimate.target_bytes),
                estimate.required_reduction_pct,
                estimate.page_count,
                estimate.image_count
            )
        })
    }

    // -- Images ---------------------------------------------------------------

    pub fn resize_image(
        &self,
        input: &Path,
        output: &Path,
        target_size: Option<&str>,
        dimensions: Option<&str>,
        format: Option<RasterFormat>,
    ) -> Result<()> {
        let format = match format {
            Some(format) => format,
            None => format_from_extension(output)?,
        };
        let request = ResizeRequest {
            target_bytes: target_size.map(parse_size).transpose()?,
            dimensions: dimensions.map(parse_dimensions).transpose()?,
            format,
        };
        let outcome = resize_image_file(input, output, &request)?;
        let report = json!({
            "output": output,
            "bytes": outcome.bytes.len(),
            "width": outcome.width,
            "height": outcome.height,
            "quality": outcome.achieved_quality,
        });
        self.emit(&report, || {
            format!(
                "{}: {}x{}, {}{}",
                output.display(),
                outcome.width,
                outcome.height,
                format_size(outcome.bytes.len() as u64),
                quality_note(outcome.achieved_quality, request.target_bytes)
            )
        })
    }

    pub fn compress_image(
        &self,
        input: &Path,
        output: &Path,
        target_size: &str,
        preserve_transparency: bool,
    ) -> Result<()> {
        let target = parse_size(target_size)?;
        let outcome = compress_image_file(input, output, target, preserve_transparency)?;
        let report = json!({
            "output": output,
            "bytes": outcome.bytes.len(),
            "target_bytes": target,
            "quality": outcome.achieved_quality,
        });
        self.emit(&report, || {
            format!(
                "{}: {}{}",
                output.display(),
                format_size(outcome.bytes.len() as u64),
                quality_note(outcome.achieved_quality, Some(target))
            )
        })
    }

    pub fn batch_resize(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        target_size: Option<&str>,
        dimensions: Option<&str>,
        format: RasterFormat,
    ) -> Result<()> {
        let request = ResizeRequest {
            target_bytes: target_size.map(parse_size).transpose()?,
            dimensions: dimensions.map(parse_dimensions).transpose()?,
            format,
        };
        let workers = self.config.worker_count.unwrap_or_else(default_worker_count);
        let report = batch_resize(input_dir, output_dir, &request, workers)?;
        self.emit(&report, || {
            format!(
                "{} images written to {}, {} failed",
                report.processed,
                output_dir.display(),
                report.failed
            )
        })
    }

    // -- Pages ----------------------------------------------------------------

    fn blank_detector(&self, threshold: Option<f64>) -> Result<BlankPageDetector> {
        let mut settings = BlankSettings::from_config(&self.config);
        if let Some(threshold) = threshold {
            settings = settings.with_threshold(threshold);
        }
        Ok(BlankPageDetector::new(default_backend())
            .with_settings(settings)
            .with_dpi(self.config.scan_dpi)
            .with_options(self.pipeline()?))
    }

    pub fn scan_blank(&self, input: &Path, threshold: Option<f64>) -> Result<()> {
        let pages = self.blank_detector(threshold)?.scan(input)?;
        self.emit(&json!({ "blank_pages": pages }), || {
            if pages.is_empty() {
                "No blank pages.".to_string()
            } else {
                let list: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
                format!("Blank pages: {}", list.join(", "))
            }
        })
    }

    pub fn remove_blank(&self, input: &Path, output: &Path, threshold: Option<f64>) -> Result<()> {
        let report = self.blank_detector(threshold)?.remove(input, output)?;
        self.emit(&report, || {
            if report.copied_unchanged {
                format!("No pages removed; copied to {}", output.display())
            } else {
                format!(
                    "Removed {} of {} pages -> {}",
                    report.removed.len(),
                    report.total_pages,
                    output.display()
                )
            }
        })
    }

    pub fn extract_images(
        &self,
        input: &Path,
        output_dir: &Path,
        format: RasterFormat,
        dpi: Option<u32>,
    ) -> Result<()> {
        let dpi = dpi.unwrap_or(self.config.extract_dpi);
        let paths = PageRasterExtractor::new(default_backend())
            .with_jpeg_quality(self.config.extract_jpeg_quality)
            .with_options(self.pipeline()?)
            .extract(input, output_dir, format, dpi)?;
        self.emit(&json!({ "written": paths }), || {
            format!("{} pages written to {}", paths.len(), output_dir.display())
        })
    }

    // -- Samples --------------------------------------------------------------

    pub fn samples(&self, output_dir: &Path, pages: usize) -> Result<()> {
        let writer = SampleWriter::new();
        let blanks: Vec<usize> = [2, 4].into_iter().filter(|&n| n <= pages).collect();
        let documents = [
            ("text.pdf", writer.text_document(pages)?),
            ("with_blanks.pdf", writer.with_blank_pages(pages, &blanks)?),
            ("images.pdf", writer.image_document(pages.min(8), 1600, 1200)?),
        ];

        let mut written = Vec::new();
        for (name, bytes) in &documents {
            let path = output_dir.join(name);
            SampleWriter::write_to(bytes, &path)?;
            written.push(json!({ "path": path, "bytes": bytes.len() }));
        }
        self.emit(&json!({ "samples": written }), || {
            documents
                .iter()
                .map(|(name, bytes)| {
                    format!(
                        "{}: {}",
                        output_dir.join(name).display(),
                        format_size(bytes.len() as u64)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
    }
}

// -- Argument helpers ---------------------------------------------------------

/// `<dir>/<stem>_<suffix>.<ext>` next to `input`.
fn sibling(input: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    input.with_file_name(format!("{stem}_{suffix}.{ext}"))
}

/// `600x400` → `(600, 400)`.
fn parse_dimensions(raw: &str) -> Result<(u32, u32)> {
    let invalid = || {
        BlattwerkError::InvalidArgument(format!(
            "dimensions '{raw}' should look like 600x400"
        ))
    };
    let (w, h) = raw
        .trim()
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(invalid)?;
    let width: u32 = w.parse().map_err(|_| invalid())?;
    let height: u32 = h.parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

fn format_from_extension(path: &Path) -> Result<RasterFormat> {
    path.extension()
        .and_then(|ext| RasterFormat::from_extension(&ext.to_string_lossy()))
        .ok_or_else(|| {
            BlattwerkError::InvalidArgument(format!(
                "cannot tell the image format of {}; pass --format",
                path.display()
            ))
        })
}

fn quality_note(quality: Option<u8>, target: Option<u64>) -> String {
    match (quality, target) {
        (_, None) => String::new(),
        (Some(q), Some(_)) => format!(" at quality {q}"),
        (None, Some(t)) => format!(" (could not reach {})", format_size(t)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_parse() {
        assert_eq!(parse_dimensions("600x400").unwrap(), (600, 400));
        assert_eq!(parse_dimensions(" 32 X 16 ").unwrap(), (32, 16));
        assert!(parse_dimensions("600").is_err());
        assert!(parse_dimensions("0x10").is_err());
        assert!(parse_dimensions("axb").is_err());
    }

    #[test]
    fn sibling_keeps_directory() {
        assert_eq!(
            sibling(Path::new("/data/report.pdf"), "compressed", "pdf"),
            PathBuf::from("/data/report_compressed.pdf")
        );
    }

    #[test]
    fn format_comes_from_extension() {
        assert_eq!(
            format_from_extension(Path::new("a.JPEG")).unwrap(),
            RasterFormat::Jpeg
        );
        assert!(format_from_extension(Path::new("a.tiff")).is_err());
    }

    #[test]
    fn flags_override_config() {
        let session = Session::load(None, Some(2), true, false).unwrap();
        assert_eq!(session.config.worker_count, Some(2));
        assert_eq!(session.config.isolation, IsolationMode::Thread);
        assert!(Session::load(None, Some(0), false, false).is_err());
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "blank_threshold": 0.9, "isolation": "thread" }"#).unwrap();
        let session = Session::load(Some(&path), None, false, true).unwrap();
        assert_eq!(session.config.blank_threshold, 0.9);
        assert_eq!(session.config.isolation, IsolationMode::Thread);
    }

    #[test]
    fn samples_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::load(None, None, true, true).unwrap();
        session.samples(dir.path(), 4).unwrap();
        for name in ["text.pdf", "with_blanks.pdf", "images.pdf"] {
            assert!(dir.path().join(name).exists(), "{name} missing");
        }
    }
}
