//! Page splitting: turn a resolved input into per-page images.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster at 300 DPI would be enormous.
//! The target width is derived from the page's physical width and the
//! configured DPI, then capped at `max_rendered_pixels`, keeping memory
//! bounded regardless of the physical page size.

use crate::config::PipelineConfig;
use crate::error::ScanFuseError;
use crate::pipeline::input::{InputKind, ResolvedInput};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// One page of the input document, rasterised.
#[derive(Debug)]
pub struct Page {
    /// 0-based page index.
    pub index: usize,
    pub image: DynamicImage,
}

/// Split the input into pages: every PDF page rendered, or the single image.
pub async fn split_pages(
    input: &ResolvedInput,
    config: &PipelineConfig,
) -> Result<Vec<Page>, ScanFuseError> {
    let path = input.path().to_path_buf();
    match input.kind() {
        InputKind::Pdf => {
            let dpi = config.dpi;
            let max_pixels = config.max_rendered_pixels;
            tokio::task::spawn_blocking(move || render_pdf_blocking(&path, dpi, max_pixels))
                .await
                .map_err(|e| ScanFuseError::Internal(format!("render task panicked: {e}")))?
        }
        InputKind::Image => {
            tokio::task::spawn_blocking(move || load_image_blocking(&path))
                .await
                .map_err(|e| ScanFuseError::Internal(format!("decode task panicked: {e}")))?
        }
    }
}

/// Blocking implementation of PDF rasterisation.
fn render_pdf_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<Page>, ScanFuseError> {
    let pdfium = Pdfium::default();

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| ScanFuseError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!(pages = total_pages, "PDF loaded");

    let mut results = Vec::with_capacity(total_pages);
    for idx in 0..total_pages {
        let page = pages
            .get(idx as u16)
            .map_err(|e| ScanFuseError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;

        // Physical width in points (1/72 inch) scaled to the requested DPI,
        // capped at the pixel budget.
        let target_width =
            ((page.width().value * dpi as f32 / 72.0).round() as u32).min(max_pixels);
        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width as i32)
            .set_maximum_height(max_pixels as i32);

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| ScanFuseError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                })?;

        let image = bitmap.as_image();
        debug!(
            page = idx + 1,
            width = image.width(),
            height = image.height(),
            "rendered page"
        );
        results.push(Page { index: idx, image });
    }

    Ok(results)
}

/// Blocking implementation of single-image loading.
fn load_image_blocking(path: &Path) -> Result<Vec<Page>, ScanFuseError> {
    let image = image::open(path).map_err(|e| ScanFuseError::ImageDecode {
        detail: format!("'{}': {e}", path.display()),
    })?;
    debug!(
        width = image.width(),
        height = image.height(),
        "loaded image input"
    );
    Ok(vec![Page { index: 0, image }])
}
