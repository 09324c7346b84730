// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page extraction: render every page to a PNG or JPEG file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{PageExtent, RasterFormat};
use blattwerk_render::{PageDocument, RasterBackend, default_backend};
use image::DynamicImage;
use tracing::{debug, info, instrument};

use crate::image::encoder_for;
use crate::jobs::{PageJob, PageOutput, PipelineOptions, dispatch};

/// Longest rendered side, in pixels. Larger requests get a lower DPI.
pub const MAX_RENDER_SIDE_PX: u32 = 10_000;

/// JPEG quality for extracted pages unless configured otherwise.
pub const DEFAULT_EXTRACT_JPEG_QUALITY: u8 = 90;

/// `dpi` lowered until neither side of `extent` exceeds
/// [`MAX_RENDER_SIDE_PX`]. Never below 1.
pub fn effective_dpi(extent: PageExtent, dpi: u32) -> u32 {
    let longest_pt = extent.width_pt.abs().max(extent.height_pt.abs());
    if longest_pt <= 0.0 {
        return dpi.max(1);
    }
    let cap = (MAX_RENDER_SIDE_PX as f32 * 72.0 / longest_pt).floor() as u32;
    dpi.min(cap).max(1)
}

/// File name of the image for 0-based page `index` of `source`.
pub fn page_file_name(source: &Path, index: usize, format: RasterFormat) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    format!("{stem}_page_{}.{}", index + 1, format.extension())
}

/// Render page `index` and write it into `output_dir`. Returns the path
/// written.
pub fn render_page(
    document: &mut dyn PageDocument,
    index: usize,
    source: &Path,
    output_dir: &Path,
    format: RasterFormat,
    dpi: u32,
    jpeg_quality: u8,
) -> Result<PathBuf> {
    let dpi = effective_dpi(document.page_extent(index)?, dpi);
    let image = DynamicImage::ImageRgb8(document.rasterize(index, dpi)?);
    let bytes = encoder_for(format).encode(&image, jpeg_quality)?;

    let path = output_dir.join(page_file_name(source, index, format));
    std::fs::write(&path, &bytes)?;
    debug!(page = index + 1, dpi, bytes = bytes.len(), path = %path.display(), "page written");
    Ok(path)
}

/// Renders pages to image files through the page scheduler.
pub struct PageRasterExtractor {
    backend: Arc<dyn RasterBackend>,
    jpeg_quality: u8,
    options: PipelineOptions,
}

impl PageRasterExtractor {
    pub fn new(backend: Arc<dyn RasterBackend>) -> Self {
        Self {
            backend,
            jpeg_quality: DEFAULT_EXTRACT_JPEG_QUALITY,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Write every page of `document_path` into `output_dir` (created if
    /// missing) as `<stem>_page_<n>.<ext>`. Returns the written paths in page
    /// order.
    #[instrument(skip_all, fields(
        path = %document_path.as_ref().display(),
        output_dir = %output_dir.as_ref().display(),
        format = %format,
        dpi = dpi,
    ))]
    pub fn extract(
        &self,
        document_path: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        format: RasterFormat,
        dpi: u32,
    ) -> Result<Vec<PathBuf>> {
        if dpi == 0 {
            return Err(BlattwerkError::InvalidArgument("dpi must be positive".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(BlattwerkError::InvalidArgument(format!(
                "JPEG quality must lie in [1, 100], got {}",
                self.jpeg_quality
            )));
        }
        let (source, output_dir) = (document_path.as_ref(), output_dir.as_ref());
        let page_count = self.backend.open(source)?.page_count();
        if page_count == 0 {
            return Err(BlattwerkError::EmptyDocument(source.display().to_string()));
        }
        std::fs::create_dir_all(output_dir)?;

        let job = PageJob::Rasterize {
            source: source.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            format,
            dpi,
            jpeg_quality: self.jpeg_quality,
        };
        let outputs = dispatch(job, page_count, Arc::clone(&self.backend), &self.options)?;

        let paths = outputs
            .into_iter()
            .map(|output| match output {
                PageOutput::Written { path } => Ok(path),
                other => Err(BlattwerkError::WorkerProtocol(format!(
                    "page extraction returned {other:?}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        info!(pages = paths.len(), "pages extracted");
        Ok(paths)
    }
}

/// Render every page of `document_path` into `output_dir` with the default
/// renderer. Returns the number of images written.
///
/// Pages are spread over one thread per core inside the calling process; see
/// [`extract_pages_as_images_with`] for worker processes.
pub fn extract_pages_as_images(
    document_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    format: RasterFormat,
    dpi: u32,
) -> Result<usize> {
    extract_pages_as_images_with(
        document_path,
        output_dir,
        format,
        dpi,
        PipelineOptions::default(),
    )
}

/// [`extract_pages_as_images`] with explicit worker count and isolation.
pub fn extract_pages_as_images_with(
    document_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    format: RasterFormat,
    dpi: u32,
    options: PipelineOptions,
) -> Result<usize> {
    PageRasterExtractor::new(default_backend())
        .with_options(options)
        .extract(document_path, output_dir, format, dpi)
        .map(|paths| paths.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SyntheticBackend;

    fn extractor(backend: SyntheticBackend) -> PageRasterExtractor {
        PageRasterExtractor::new(Arc::new(backend)).with_options(PipelineOptions::threads(2))
    }

    #[test]
    fn effective_dpi_caps_long_sides() {
        let letter = PageExtent::LETTER;
        assert_eq!(effective_dpi(letter, 300), 300);
        // 792 pt at 1000 dpi would be 11 000 px.
        let capped = effective_dpi(letter, 1000);
        assert!(capped < 1000);
        assert!(letter.pixel_size(capped).1 <= MAX_RENDER_SIDE_PX);

        let poster = PageExtent {
            width_pt: 10_000_000.0,
            height_pt: 10.0,
        };
        assert_eq!(effective_dpi(poster, 300), 1);
    }

    #[test]
    fn file_names_are_one_based() {
        let name = page_file_name(Path::new("/tmp/report.pdf"), 0, RasterFormat::Png);
        assert_eq!(name, "report_page_1.png");
        let name = page_file_name(Path::new("scan.pdf"), 9, RasterFormat::Jpeg);
        assert_eq!(name, "scan_page_10.jpg");
    }

    #[test]
    fn writes_one_file_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pages");
        let paths = extractor(SyntheticBackend::with_blank_pages(3, &[1]))
            .extract("doc.pdf", &out, RasterFormat::Png, 72)
            .unwrap();

        assert_eq!(paths.len(), 3);
        for (i, path) in paths.iter().enumerate() {
            assert_eq!(path, &out.join(format!("doc_page_{}.png", i + 1)));
            let img = image::open(path).unwrap();
            assert_eq!((img.width(), img.height()), (72, 100));
        }
    }

    #[test]
    fn jpeg_pages_are_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let paths = extractor(SyntheticBackend::with_blank_pages(2, &[]))
            .extract("doc.pdf", dir.path(), RasterFormat::Jpeg, 36)
            .unwrap();
        let bytes = std::fs::read(&paths[1]).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn zero_dpi_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            extractor(SyntheticBackend::with_blank_pages(1, &[]))
                .extract("doc.pdf", dir.path(), RasterFormat::Png, 0)
                .is_err()
        );
    }

    #[cfg(not(feature = "mupdf"))]
    #[test]
    fn stub_backend_reports_missing_renderer() {
        let dir = tempfile::tempdir().unwrap();
        let err =
            extract_pages_as_images("doc.pdf", dir.path(), RasterFormat::Png, 72).unwrap_err();
        assert!(matches!(err, BlattwerkError::RenderUnavailable(_)));
    }
}
