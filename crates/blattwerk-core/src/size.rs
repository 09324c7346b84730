// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-friendly byte sizes: "2MB", "500KB", "1.5" (megabytes) and back.

use crate::error::{BlattwerkError, Result};

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Parse a size string into bytes. A bare number is read as megabytes.
///
/// Accepted suffixes (case-insensitive): `B`, `KB`, `MB`, `GB`.
pub fn parse_size(input: &str) -> Result<u64> {
    let s = input.trim().to_ascii_uppercase();
    let (number, multiplier) = if let Some(n) = s.strip_suffix("GB") {
        (n, GIB)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, MIB)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, KIB)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1.0)
    } else {
        (s.as_str(), MIB)
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| BlattwerkError::InvalidArgument(format!("invalid size '{input}'")))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(BlattwerkError::InvalidArgument(format!(
            "size must be positive, got '{input}'"
        )));
    }

    let bytes = (value * multiplier).round();
    if bytes < 1.0 {
        return Err(BlattwerkError::InvalidArgument(format!(
            "size '{input}' rounds to zero bytes"
        )));
    }
    Ok(bytes as u64)
}

/// Render a byte count with two decimals in the largest fitting unit.
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.2} {}", UNITS[unit])
}
