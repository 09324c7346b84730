// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Embedded image recompression: downsample and re-encode DCT images inside a
// PDF against a per-image share of the byte budget.

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{PresetSettings, QualityRange};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use lopdf::{Object, ObjectId, Stream};
use tracing::{debug, info, instrument, warn};

use super::reader::{PdfDocument, is_image};
use crate::image::encoder::JpegRasterEncoder;
use crate::image::search::QualitySearch;

/// Images whose longer side is at most this are never downsampled.
pub const DOWNSAMPLE_THRESHOLD_PX: u32 = 1024;

/// Longest page edge an embedded image is assumed to span, in inches.
const PAGE_LONG_EDGE_IN: u32 = 11;

/// Longest side an embedded image keeps at `raster_dpi`: a full page edge at
/// that resolution, never below [`DOWNSAMPLE_THRESHOLD_PX`]. Images already
/// within the cap are left alone, so a second pass changes nothing.
pub fn max_image_side(raster_dpi: u32) -> u32 {
    raster_dpi
        .saturating_mul(PAGE_LONG_EDGE_IN)
        .max(DOWNSAMPLE_THRESHOLD_PX)
}

impl PdfDocument {
    /// Re-encode every DCT image in RGB or grayscale.
    ///
    /// Images whose longer side exceeds [`max_image_side`] are first scaled
    /// down to it. Each image then gets the highest JPEG
    /// quality in `[min_jpeg_quality, jpeg_quality]` that fits
    /// `len × min(1, ratio)` bytes, and is replaced only when the result is
    /// smaller than what is already embedded. Images that fail to decode are
    /// skipped. Returns how many images were replaced.
    #[instrument(skip_all, fields(ratio = ratio))]
    pub fn recompress_images(&mut self, settings: &PresetSettings, ratio: f64) -> Result<usize> {
        let range = QualityRange::new(settings.min_jpeg_quality, settings.jpeg_quality)?;
        let encoder = JpegRasterEncoder;
        let search = QualitySearch::new(&encoder).with_range(range)?;
        let share = ratio.clamp(0.0, 1.0);

        let candidates: Vec<ObjectId> = self
            .inner()
            .objects
            .iter()
            .filter_map(|(id, object)| match object {
                Object::Stream(stream) if is_recompressible(stream) => Some(*id),
                _ => None,
            })
            .collect();

        let mut replaced = 0;
        for id in candidates {
            let Ok(Object::Stream(stream)) = self.inner_mut().get_object_mut(id) else {
                continue;
            };
            match recompress_one(stream, &search, settings.raster_dpi, share) {
                Ok(true) => replaced += 1,
                Ok(false) => {}
                Err(err) => warn!(object = ?id, error = %err, "skipping embedded image"),
            }
        }

        info!(replaced, "embedded images recompressed");
        Ok(replaced)
    }
}

fn recompress_one(
    stream: &mut Stream,
    search: &QualitySearch<'_>,
    raster_dpi: u32,
    share: f64,
) -> Result<bool> {
    let original_len = stream.content.len() as u64;
    let decoded = image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
        .map_err(|err| BlattwerkError::ImageError(format!("embedded JPEG: {err}")))?;

    let image = match decoded {
        DynamicImage::ImageLuma8(_) => downsample(decoded, raster_dpi),
        other => downsample(DynamicImage::ImageRgb8(other.to_rgb8()), raster_dpi),
    };
    let budget = (original_len as f64 * share).floor() as u64;
    let outcome = search.find_quality(&image, budget)?;

    if outcome.bytes.len() as u64 >= original_len {
        debug!(original_len, candidate = outcome.bytes.len(), "kept embedded image");
        return Ok(false);
    }

    let color_space = match image {
        DynamicImage::ImageLuma8(_) => "DeviceGray",
        _ => "DeviceRGB",
    };
    debug!(
        original_len,
        new_len = outcome.bytes.len(),
        quality = outcome.quality,
        width = image.width(),
        height = image.height(),
        "replaced embedded image"
    );
    stream.dict.set("Width", image.width() as i64);
    stream.dict.set("Height", image.height() as i64);
    stream.dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    stream.dict.set("BitsPerComponent", 8i64);
    stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    stream.dict.remove(b"DecodeParms");
    stream.set_content(outcome.bytes);
    Ok(true)
}

fn downsample(image: DynamicImage, raster_dpi: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let longest = width.max(height);
    let cap = max_image_side(raster_dpi);
    if longest <= cap {
        return image;
    }
    let scale = cap as f64 / longest as f64;
    let new_width = ((width as f64 * scale).round() as u32).clamp(1, cap);
    let new_height = ((height as f64 * scale).round() as u32).clamp(1, cap);
    image.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

/// A single-filter DCT image in DeviceRGB or DeviceGray.
fn is_recompressible(stream: &Stream) -> bool {
    if !is_image(&stream.dict) || stream.dict.has(b"SMask") || stream.dict.has(b"Mask") {
        return false;
    }
    let dct = match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == b"DCTDecode",
        Ok(Object::Array(filters)) => {
            filters.len() == 1 && matches!(&filters[0], Object::Name(name) if name == b"DCTDecode")
        }
        _ => false,
    };
    let color = matches!(
        stream.dict.get(b"ColorSpace").and_then(Object::as_name),
        Ok(b"DeviceRGB") | Ok(b"DeviceGray")
    );
    dct && color
}
