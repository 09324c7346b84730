// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BlattwerkError, Result};

/// How page workers are isolated from each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// One OS process per chunk.
    #[default]
    Process,
    /// One thread per chunk inside the current process.
    Thread,
}

/// Tunables for compression and page processing.
///
/// Library entry points take these values as explicit parameters; the CLI
/// builds one from defaults or a JSON file and threads it through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fraction above the byte budget still accepted by document compression.
    pub tolerance: f64,
    /// Maximum persist-and-measure passes per document.
    pub max_iterations: u32,
    /// Minimum whiteness ratio for a page to count as blank.
    pub blank_threshold: f64,
    /// Channel value every RGB component must exceed to count as bright.
    pub brightness_cutoff: u8,
    /// Every n-th pixel (row-major) is sampled during blank detection.
    pub sample_stride: usize,
    /// Rasterisation resolution for blank detection.
    pub scan_dpi: u32,
    /// Default resolution for page extraction.
    pub extract_dpi: u32,
    /// JPEG quality used when extracting pages as JPEG.
    pub extract_jpeg_quality: u8,
    /// Worker count; `None` means one per available core.
    pub worker_count: Option<usize>,
    pub isolation: IsolationMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerance: crate::types::DEFAULT_TOLERANCE,
            max_iterations: 5,
            blank_threshold: 0.98,
            brightness_cutoff: 240,
            sample_stride: 10,
            scan_dpi: 72,
            extract_dpi: 300,
            extract_jpeg_quality: 90,
            worker_count: None,
            isolation: IsolationMode::Process,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values outside their meaningful ranges.
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(invalid(format!(
                "tolerance must be a non-negative fraction, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.blank_threshold) {
            return Err(invalid(format!(
                "blank_threshold must lie in [0, 1], got {}",
                self.blank_threshold
            )));
        }
        if self.sample_stride == 0 {
            return Err(invalid("sample_stride must be at least 1".into()));
        }
        if self.scan_dpi == 0 || self.extract_dpi == 0 {
            return Err(invalid("dpi values must be greater than zero".into()));
        }
        if !(1..=100).contains(&self.extract_jpeg_quality) {
            return Err(invalid(format!(
                "extract_jpeg_quality must lie in [1, 100], got {}",
                self.extract_jpeg_quality
            )));
        }
        if self.worker_count == Some(0) {
            return Err(invalid("worker_count must be at least 1".into()));
        }
        Ok(())
    }
}

fn invalid(detail: String) -> BlattwerkError {
    BlattwerkError::InvalidArgument(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan_dpi, 72);
        assert_eq!(config.isolation, IsolationMode::Process);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "blank_threshold": 0.9, "isolation": "thread" }"#).unwrap();
        assert_eq!(config.blank_threshold, 0.9);
        assert_eq!(config.isolation, IsolationMode::Thread);
        assert_eq!(config.max_iterations, 5);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = EngineConfig {
            blank_threshold: 1.5,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BlattwerkError::InvalidArgument(_))
        ));

        let config = EngineConfig {
            worker_count: Some(0),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_json() {
        let dir = std::env::temp_dir().join(format!("blattwerk-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.json");
        std::fs::write(&path, r#"{ "max_iterations": 3 }"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.max_iterations, 3);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
