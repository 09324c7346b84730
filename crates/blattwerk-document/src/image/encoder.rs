// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster encoders: turn a decoded image plus a quality value into bytes.

use std::io::Cursor;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{QualityRange, RasterFormat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ExtendedColorType, ImageEncoder, Rgb, RgbImage};

/// Encodes an in-memory image at a given quality.
///
/// Encoding is deterministic for a given encoder version and has no side
/// effects, so callers may probe the same image at many qualities.
pub trait RasterEncoder: Send + Sync {
    fn format(&self) -> RasterFormat;

    /// Qualities this encoder distinguishes between.
    fn quality_range(&self) -> QualityRange {
        self.format().quality_range()
    }

    /// Encode `image` at `quality`, clamped into [`RasterEncoder::quality_range`].
    ///
    /// Fails with `UnsupportedFormat` if the image's colour mode cannot be
    /// written directly; see [`normalize_for`].
    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>>;
}

/// Baseline JPEG via the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegRasterEncoder;

impl RasterEncoder for JpegRasterEncoder {
    fn format(&self) -> RasterFormat {
        RasterFormat::Jpeg
    }

    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        let color = match image.color() {
            ColorType::L8 => ExtendedColorType::L8,
            ColorType::Rgb8 => ExtendedColorType::Rgb8,
            other => {
                return Err(BlattwerkError::UnsupportedFormat(format!(
                    "JPEG cannot encode {other:?} directly"
                )));
            }
        };
        let quality = self.quality_range().clamp(quality);

        let mut buffer = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buffer, quality)
            .write_image(image.as_bytes(), image.width(), image.height(), color)
            .map_err(|e| BlattwerkError::ImageError(format!("JPEG encoding failed: {e}")))?;
        Ok(buffer.into_inner())
    }
}

/// Lossless PNG at maximum compression. Quality is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngRasterEncoder;

impl RasterEncoder for PngRasterEncoder {
    fn format(&self) -> RasterFormat {
        RasterFormat::Png
    }

    fn encode(&self, image: &DynamicImage, _quality: u8) -> Result<Vec<u8>> {
        let color = image.color();
        if !matches!(
            color,
            ColorType::L8
                | ColorType::La8
                | ColorType::Rgb8
                | ColorType::Rgba8
                | ColorType::L16
                | ColorType::La16
                | ColorType::Rgb16
                | ColorType::Rgba16
        ) {
            return Err(BlattwerkError::UnsupportedFormat(format!(
                "PNG cannot encode {color:?} directly"
            )));
        }

        let mut buffer = Cursor::new(Vec::new());
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive)
            .write_image(image.as_bytes(), image.width(), image.height(), color.into())
            .map_err(|e| BlattwerkError::ImageError(format!("PNG encoding failed: {e}")))?;
        Ok(buffer.into_inner())
    }
}

/// Boxed encoder for `format`.
pub fn encoder_for(format: RasterFormat) -> Box<dyn RasterEncoder> {
    match format {
        RasterFormat::Jpeg => Box::new(JpegRasterEncoder),
        RasterFormat::Png => Box::new(PngRasterEncoder),
    }
}

/// Convert `image` into a colour mode the encoder for `format` accepts.
///
/// JPEG: alpha is flattened onto white, grayscale stays grayscale, everything
/// else becomes 8-bit RGB. PNG: 8-bit modes pass through, others become RGBA.
pub fn normalize_for(format: RasterFormat, image: DynamicImage) -> DynamicImage {
    match format {
        RasterFormat::Jpeg => match image.color() {
            ColorType::L8 | ColorType::Rgb8 => image,
            ColorType::L16 => DynamicImage::ImageLuma8(image.to_luma8()),
            color if color.has_alpha() => DynamicImage::ImageRgb8(flatten_onto_white(&image)),
            _ => DynamicImage::ImageRgb8(image.to_rgb8()),
        },
        RasterFormat::Png => match image.color() {
            ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => image,
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => image,
            _ => DynamicImage::ImageRgba8(image.to_rgba8()),
        },
    }
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}
