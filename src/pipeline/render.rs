//! PDF rasterisation: render the first page of an attachment via pdfium.
//!
//! Rendering is CPU-bound and pdfium keeps thread-local state, so callers run
//! [`PageRenderer::render_first_page`] inside `tokio::task::spawn_blocking`.
//! The PDF is loaded straight from the downloaded bytes; nothing touches disk.

use crate::error::IngestError;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Turns PDF bytes into a raster image of page 1.
pub trait PageRenderer: Send + Sync {
    /// `Ok(None)` when the document has no pages.
    fn render_first_page(
        &self,
        pdf: &[u8],
        dpi: u32,
    ) -> Result<Option<DynamicImage>, IngestError>;
}

/// [`PageRenderer`] backed by the pdfium shared library.
///
/// The library is looked up at `PDFIUM_LIB_PATH` (a file or the directory
/// holding it) when set, otherwise in the system library path.
///
/// The library is bound on first use and reused for every later render;
/// a failed bind is retried on the next call.
pub struct PdfiumRenderer {
    max_rendered_pixels: u32,
    pdfium: OnceCell<Pdfium>,
}

impl std::fmt::Debug for PdfiumRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumRenderer")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("bound", &self.pdfium.get().is_some())
            .finish()
    }
}

impl PdfiumRenderer {
    pub fn new(max_rendered_pixels: u32) -> Self {
        Self {
            max_rendered_pixels,
            pdfium: OnceCell::new(),
        }
    }

    /// Pixel cap as pdfium expects it.
    fn max_dimension(&self) -> i32 {
        i32::try_from(self.max_rendered_pixels).unwrap_or(i32::MAX)
    }

    fn bind() -> Result<Pdfium, IngestError> {
        let bindings = match std::env::var("PDFIUM_LIB_PATH") {
            Ok(path) if !path.is_empty() => {
                let lib = if std::path::Path::new(&path).is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    std::path::PathBuf::from(&path)
                };
                Pdfium::bind_to_library(lib)
            }
            _ => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| IngestError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_first_page(
        &self,
        pdf: &[u8],
        dpi: u32,
    ) -> Result<Option<DynamicImage>, IngestError> {
        let pdfium = self.pdfium.get_or_try_init(Self::bind)?;

        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| IngestError::RasterisationFailed {
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());
        if pages.len() == 0 {
            return Ok(None);
        }

        let page = pages.get(0).map_err(|e| IngestError::RasterisationFailed {
            detail: format!("{:?}", e),
        })?;

        // PDF user space is 72 units per inch.
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / 72.0)
            .set_maximum_width(self.max_dimension())
            .set_maximum_height(self.max_dimension());

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| IngestError::RasterisationFailed {
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page 1 at {} DPI → {}x{} px",
            dpi,
            image.width(),
            image.height()
        );
        Ok(Some(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_cap_saturates_instead_of_wrapping() {
        assert_eq!(PdfiumRenderer::new(8000).max_dimension(), 8000);
        assert_eq!(PdfiumRenderer::new(u32::MAX).max_dimension(), i32::MAX);
    }

    #[test]
    fn renderer_starts_unbound() {
        let r = PdfiumRenderer::new(8000);
        assert!(format!("{r:?}").contains("bound: false"));
    }
}
