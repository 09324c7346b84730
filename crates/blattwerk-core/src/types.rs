// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Blattwerk: byte budgets, quality ranges, presets,
// work chunks and the reports returned by the compression engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BlattwerkError, Result};

/// Default tolerance applied on top of a byte budget (5 %).
pub const DEFAULT_TOLERANCE: f64 = 0.05;

/// Strongest deflate level accepted by the stream compressor.
pub const MAX_DEFLATE_LEVEL: u32 = 9;

// ---------------------------------------------------------------------------
// Budgets and quality
// ---------------------------------------------------------------------------

/// Maximum acceptable output size plus a tolerance fraction.
///
/// `bytes` is always greater than zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ByteBudget {
    bytes: u64,
    tolerance: f64,
}

impl ByteBudget {
    /// Budget with the default 5 % tolerance.
    pub fn new(bytes: u64) -> Result<Self> {
        Self::with_tolerance(bytes, DEFAULT_TOLERANCE)
    }

    pub fn with_tolerance(bytes: u64, tolerance: f64) -> Result<Self> {
        if bytes == 0 {
            return Err(BlattwerkError::InvalidBudget(
                "budget must be greater than zero bytes".into(),
            ));
        }
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(BlattwerkError::InvalidBudget(format!(
                "tolerance must be a non-negative fraction, got {tolerance}"
            )));
        }
        Ok(Self { bytes, tolerance })
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Largest size still accepted once the tolerance is applied.
    pub fn limit(&self) -> u64 {
        (self.bytes as f64 * (1.0 + self.tolerance)).floor() as u64
    }

    /// Strict check against `bytes`, ignoring the tolerance.
    pub fn fits(&self, size: u64) -> bool {
        size <= self.bytes
    }

    /// Check against [`ByteBudget::limit`].
    pub fn fits_with_tolerance(&self, size: u64) -> bool {
        size <= self.limit()
    }
}

/// Closed interval of encoder quality values, `1 <= low <= high <= 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityRange {
    low: u8,
    high: u8,
}

impl QualityRange {
    /// The full `[1, 100]` range used by lossy codecs.
    pub const FULL: QualityRange = QualityRange { low: 1, high: 100 };

    pub fn new(low: u8, high: u8) -> Result<Self> {
        if low == 0 || high > 100 || low > high {
            return Err(BlattwerkError::InvalidArgument(format!(
                "quality range [{low}, {high}] must satisfy 1 <= low <= high <= 100"
            )));
        }
        Ok(Self { low, high })
    }

    /// A range containing a single quality value (lossless formats).
    pub fn fixed(quality: u8) -> Self {
        let quality = quality.clamp(1, 100);
        Self {
            low: quality,
            high: quality,
        }
    }

    pub fn low(&self) -> u8 {
        self.low
    }

    pub fn high(&self) -> u8 {
        self.high
    }

    pub fn contains(&self, quality: u8) -> bool {
        (self.low..=self.high).contains(&quality)
    }

    pub fn clamp(&self, quality: u8) -> u8 {
        quality.clamp(self.low, self.high)
    }

    /// Intersection with another range, if non-empty.
    pub fn intersect(&self, other: QualityRange) -> Option<QualityRange> {
        let low = self.low.max(other.low);
        let high = self.high.min(other.high);
        (low <= high).then_some(QualityRange { low, high })
    }
}

/// Outcome of a quality search against a byte budget.
///
/// `best_quality == None` means even the floor quality exceeded the budget;
/// `best_bytes` then holds the size produced at the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub best_quality: Option<u8>,
    pub best_bytes: u64,
}

impl SearchResult {
    pub fn met_budget(&self) -> bool {
        self.best_quality.is_some()
    }
}

// ---------------------------------------------------------------------------
// Formats and presets
// ---------------------------------------------------------------------------

/// Raster output formats produced by the encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    Jpeg,
    Png,
}

impl RasterFormat {
    /// File extension used when writing this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Achievable quality range of the format's encoder.
    pub fn quality_range(&self) -> QualityRange {
        match self {
            Self::Jpeg => QualityRange::FULL,
            Self::Png => QualityRange::fixed(100),
        }
    }

    pub fn supports_alpha(&self) -> bool {
        matches!(self, Self::Png)
    }

    /// Guess the format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

impl fmt::Display for RasterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpeg => write!(f, "JPEG"),
            Self::Png => write!(f, "PNG"),
        }
    }
}

impl FromStr for RasterFormat {
    type Err = BlattwerkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s.trim())
            .ok_or_else(|| BlattwerkError::UnsupportedFormat(format!("raster format '{s}'")))
    }
}

/// Compression aggressiveness for whole documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

/// Fixed tuning tuple behind a [`QualityPreset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetSettings {
    /// Target resolution for downsampled embedded images.
    pub raster_dpi: u32,
    /// Highest JPEG quality used when re-encoding embedded images.
    pub jpeg_quality: u8,
    /// Lowest JPEG quality the per-image search may fall to.
    pub min_jpeg_quality: u8,
    /// Starting deflate level for stream recompression.
    pub deflate_level: u32,
}

impl QualityPreset {
    pub fn settings(&self) -> PresetSettings {
        match self {
            Self::High => PresetSettings {
                raster_dpi: 200,
                jpeg_quality: 90,
                min_jpeg_quality: 60,
                deflate_level: 1,
            },
            Self::Medium => PresetSettings {
                raster_dpi: 150,
                jpeg_quality: 85,
                min_jpeg_quality: 40,
                deflate_level: 3,
            },
            Self::Low => PresetSettings {
                raster_dpi: 100,
                jpeg_quality: 75,
                min_jpeg_quality: 20,
                deflate_level: 5,
            },
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

impl FromStr for QualityPreset {
    type Err = BlattwerkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(BlattwerkError::InvalidArgument(format!(
                "unknown quality preset '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Pages and work distribution
// ---------------------------------------------------------------------------

/// Rectangular extent of a page in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageExtent {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageExtent {
    /// US Letter, the PDF default when no MediaBox is present.
    pub const LETTER: PageExtent = PageExtent {
        width_pt: 612.0,
        height_pt: 792.0,
    };

    /// Pixel dimensions of this page rendered at `dpi`.
    pub fn pixel_size(&self, dpi: u32) -> (u32, u32) {
        let scale = dpi as f32 / 72.0;
        (
            (self.width_pt.abs() * scale).round() as u32,
            (self.height_pt.abs() * scale).round() as u32,
        )
    }
}

/// Identifier of one scheduler run, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A partition of page indices assigned to one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkChunk {
    pub id: usize,
    pub indices: Vec<usize>,
}

impl WorkChunk {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// One processed page, tagged with its absolute index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub index: usize,
    pub value: T,
}

/// Ordered results of one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult<T> {
    pub chunk_id: usize,
    pub pages: Vec<PageResult<T>>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// One persist-and-measure pass of the document compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionAttempt {
    pub attempt_number: u32,
    pub deflate_level: u32,
    pub resulting_bytes: u64,
}

/// Result of compressing a document toward a byte budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionReport {
    pub original_bytes: u64,
    pub final_bytes: u64,
    pub target_bytes: u64,
    pub reduction_pct: f64,
    /// `final_bytes` is within the budget including its tolerance.
    pub met_target: bool,
    /// The compressed output was larger than the input and was discarded in
    /// favour of an unmodified copy.
    pub fell_back_to_original: bool,
    pub images_recompressed: usize,
    pub attempts: Vec<CompressionAttempt>,
    pub completed_at: DateTime<Utc>,
}

/// Percentage saved going from `original` to `final_size`; never negative.
pub fn reduction_pct(original: u64, final_size: u64) -> f64 {
    if original == 0 || final_size >= original {
        return 0.0;
    }
    (original - final_size) as f64 / original as f64 * 100.0
}

/// Heuristic classification of how reachable a document budget is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeasibilityVerdict {
    AlreadyUnderTarget,
    /// No embedded images and more than 30 % reduction required.
    TextOnlyDifficult,
    /// Embedded images and at most 70 % reduction required.
    ImageHeavyFeasible,
    /// More than 90 % reduction required.
    LikelyUnachievable,
    Feasible,
}

impl FeasibilityVerdict {
    pub fn is_feasible(&self) -> bool {
        !matches!(self, Self::TextOnlyDifficult | Self::LikelyUnachievable)
    }
}

/// Pre-flight estimate for a document compression request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feasibility {
    pub verdict: FeasibilityVerdict,
    pub current_bytes: u64,
    pub target_bytes: u64,
    pub required_reduction_pct: f64,
    pub page_count: usize,
    pub image_count: usize,
}

impl Feasibility {
    pub fn is_feasible(&self) -> bool {
        self.verdict.is_feasible()
    }
}
