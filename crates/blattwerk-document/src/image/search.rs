// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quality search: the highest encoder quality whose output fits a byte budget.

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{QualityRange, SearchResult};
use image::DynamicImage;
use tracing::{debug, instrument};

use super::encoder::RasterEncoder;

/// Binary search over `range` for the highest quality whose probed size is at
/// most `budget_bytes`.
///
/// `probe` returns the encoded size at a quality. Output size is assumed to
/// grow with quality; if it does not, the result is still a quality that
/// fits, just not necessarily the highest one.
///
/// The top of the range is probed first and returned immediately if it fits.
/// Otherwise `[low, high - 1]` is searched, at most `ceil(log2(width))` further
/// probes. When nothing fits, `best_quality` is `None` and `best_bytes` is the
/// size at `range.low()`.
pub fn search_quality(
    range: QualityRange,
    budget_bytes: u64,
    mut probe: impl FnMut(u8) -> Result<u64>,
) -> Result<SearchResult> {
    let top = probe(range.high())?;
    if top <= budget_bytes {
        return Ok(SearchResult {
            best_quality: Some(range.high()),
            best_bytes: top,
        });
    }

    let mut floor_bytes = (range.low() == range.high()).then_some(top);
    let mut best: Option<(u8, u64)> = None;
    let mut low = range.low() as i32;
    let mut high = range.high() as i32 - 1;

    while low <= high {
        let mid = ((low + high) / 2) as u8;
        let size = probe(mid)?;
        if mid == range.low() {
            floor_bytes = Some(size);
        }
        if size <= budget_bytes {
            best = Some((mid, size));
            low = mid as i32 + 1;
        } else {
            high = mid as i32 - 1;
        }
    }

    match best {
        Some((quality, bytes)) => Ok(SearchResult {
            best_quality: Some(quality),
            best_bytes: bytes,
        }),
        None => {
            let floor = match floor_bytes {
                Some(bytes) => bytes,
                None => probe(range.low())?,
            };
            Ok(SearchResult {
                best_quality: None,
                best_bytes: floor,
            })
        }
    }
}

/// Encoded output of a [`QualitySearch`].
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub result: SearchResult,
    /// Quality the bytes were encoded at: the best fit, or the floor.
    pub quality: u8,
    pub bytes: Vec<u8>,
}

/// Runs [`search_quality`] with a real encoder and keeps the winning bytes so
/// the caller never has to encode again.
pub struct QualitySearch<'a> {
    encoder: &'a dyn RasterEncoder,
    range: QualityRange,
}

impl<'a> QualitySearch<'a> {
    pub fn new(encoder: &'a dyn RasterEncoder) -> Self {
        Self {
            encoder,
            range: encoder.quality_range(),
        }
    }

    /// Narrow the search to `range`, intersected with the encoder's own range.
    pub fn with_range(mut self, range: QualityRange) -> Result<Self> {
        self.range = self.encoder.quality_range().intersect(range).ok_or_else(|| {
            BlattwerkError::InvalidArgument(format!(
                "quality range [{}, {}] is outside what {} supports",
                range.low(),
                range.high(),
                self.encoder.format()
            ))
        })?;
        Ok(self)
    }

    pub fn range(&self) -> QualityRange {
        self.range
    }

    #[instrument(skip_all, fields(format = %self.encoder.format(), budget_bytes = budget_bytes))]
    pub fn find_quality(&self, image: &DynamicImage, budget_bytes: u64) -> Result<SearchOutcome> {
        let mut fitted: Option<(u8, Vec<u8>)> = None;
        let mut floor: Option<Vec<u8>> = None;
        let floor_quality = self.range.low();

        let result = search_quality(self.range, budget_bytes, |quality| {
            let bytes = self.encoder.encode(image, quality)?;
            let size = bytes.len() as u64;
            debug!(quality, size, "probe");
            if quality == floor_quality {
                floor = Some(bytes.clone());
            }
            if size <= budget_bytes {
                fitted = Some((quality, bytes));
            }
            Ok(size)
        })?;

        let (quality, bytes) = match (result.best_quality, fitted, floor) {
            (Some(_), Some(fit), _) => fit,
            (_, _, Some(bytes)) => (floor_quality, bytes),
            _ => (floor_quality, self.encoder.encode(image, floor_quality)?),
        };

        Ok(SearchOutcome {
            result,
            quality,
            bytes,
        })
    }
}
