//! Turning an external PDF attachment into a stored, classified image.
//!
//! ```text
//! exb code ──▶ fetch PDF ──▶ size guard ──▶ render page 1 ──▶ PNG ──▶ classify
//!                                                                 │
//!                                           positive verdict ◀────┘
//!                                                  │
//!                                  <images_dir>/<document id>_page_1_bijlage.png
//! ```
//!
//! The artifact is named after the decision, not after the attachment code,
//! so consumers can find a decision's image from its id alone. Nothing is
//! cached: materializing the same pair twice downloads and renders twice.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::classify::{ImageClassifier, VisionClassifier};
use crate::pipeline::encode::encode_png;
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::locate::pdf_url;
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// What materializing one attachment produced.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializeOutcome {
    /// Stored; `path` is site-relative (e.g. `/afbeeldingen/<id>_page_1_bijlage.png`).
    Saved { path: String },
    /// Rendered but classified as something other than a map or aerial photo.
    Rejected { label: String, confidence: f32 },
    /// No usable image: download, size guard, rendering or classification failed.
    Unavailable { reason: String },
}

impl MaterializeOutcome {
    /// The stored path, if any.
    pub fn into_path(self) -> Option<String> {
        match self {
            MaterializeOutcome::Saved { path } => Some(path),
            _ => None,
        }
    }
}

/// File name of the stored first page of a decision's attachment.
pub fn artifact_file_name(document_id: &str) -> String {
    format!("{document_id}_page_1_bijlage.png")
}

/// Downloads, renders, classifies and conditionally stores PDF attachments.
pub struct PdfMaterializer {
    fetcher: Arc<Fetcher>,
    renderer: Arc<dyn PageRenderer>,
    classifier: Arc<dyn ImageClassifier>,
    repository_base_url: String,
    images_dir: PathBuf,
    public_prefix: String,
    dpi: u32,
    min_pdf_size_bytes: usize,
}

impl PdfMaterializer {
    pub fn new(
        config: &IngestConfig,
        fetcher: Arc<Fetcher>,
        renderer: Arc<dyn PageRenderer>,
        classifier: Arc<dyn ImageClassifier>,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            classifier,
            repository_base_url: config.repository_base_url.clone(),
            images_dir: config.images_dir.clone(),
            public_prefix: config.public_prefix.trim_end_matches('/').to_string(),
            dpi: config.dpi,
            min_pdf_size_bytes: config.min_pdf_size_bytes,
        }
    }

    /// pdfium rendering and the configured vision classifier.
    pub fn from_config(config: &IngestConfig, fetcher: Arc<Fetcher>) -> Result<Self, IngestError> {
        let classifier = VisionClassifier::from_config(config)?;
        Ok(Self::new(
            config,
            fetcher,
            Arc::new(PdfiumRenderer::new(config.max_rendered_pixels)),
            Arc::new(classifier),
        ))
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Materialize and return the site-relative path of the stored image,
    /// or `None` when there is no usable image.
    pub async fn materialize(&self, exb_code: &str, document_id: &str) -> Option<String> {
        self.materialize_detailed(exb_code, document_id)
            .await
            .into_path()
    }

    /// Like [`materialize`](Self::materialize), keeping the reason there is
    /// no image.
    pub async fn materialize_detailed(&self, exb_code: &str, document_id: &str) -> MaterializeOutcome {
        match self.try_materialize(exb_code, document_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error processing PDF {} for {}: {}", exb_code, document_id, e);
                MaterializeOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_materialize(
        &self,
        exb_code: &str,
        document_id: &str,
    ) -> Result<MaterializeOutcome, IngestError> {
        let url = pdf_url(&self.repository_base_url, exb_code);
        info!("Downloading and converting: {}", url);

        let pdf = match self.fetcher.get(&url).await {
            Some(outcome) if outcome.is_success() => outcome.into_body(),
            Some(outcome) => {
                warn!("No valid PDF received for {}", exb_code);
                return Ok(unavailable(format!(
                    "download failed with HTTP {}",
                    outcome.http_status.unwrap_or_default()
                )));
            }
            None => {
                warn!("No response for PDF {}", exb_code);
                return Ok(unavailable("no response".to_string()));
            }
        };

        // Error pages served with 200 OK are small; real attachments are not.
        if pdf.len() <= self.min_pdf_size_bytes {
            warn!(
                "PDF for {} is only {} bytes, ignoring",
                exb_code,
                pdf.len()
            );
            return Ok(unavailable(format!(
                "download too small ({} bytes)",
                pdf.len()
            )));
        }

        let renderer = Arc::clone(&self.renderer);
        let dpi = self.dpi;
        let page = tokio::task::spawn_blocking(move || renderer.render_first_page(&pdf, dpi))
            .await
            .map_err(|e| IngestError::Internal(format!("Render task panicked: {}", e)))??;

        let Some(page) = page else {
            warn!("No pages found in PDF for {}", exb_code);
            return Ok(unavailable("PDF has no pages".to_string()));
        };

        let png = encode_png(&page).map_err(|e| IngestError::RasterisationFailed {
            detail: format!("PNG encoding failed: {e}"),
        })?;

        let verdict = self.classifier.classify(&png).await?;
        if !verdict.is_target_class {
            info!(
                "Skipped first page of {} (classified as {} at {:.2})",
                exb_code, verdict.label, verdict.confidence
            );
            return Ok(MaterializeOutcome::Rejected {
                label: verdict.label,
                confidence: verdict.confidence,
            });
        }

        let file_name = artifact_file_name(document_id);
        write_atomic(&self.images_dir.join(&file_name), &png).await?;

        let path = format!("{}/{}", self.public_prefix, file_name);
        info!("Saved first page ({}): {}", verdict.label, path);
        Ok(MaterializeOutcome::Saved { path })
    }
}

fn unavailable(reason: String) -> MaterializeOutcome {
    MaterializeOutcome::Unavailable { reason }
}

/// Write to a temp name beside `path`, then rename over it.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IngestError> {
    let write_err = |source| IngestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("png.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_named_after_document() {
        assert_eq!(
            artifact_file_name("gmb-2024-12345"),
            "gmb-2024-12345_page_1_bijlage.png"
        );
    }

    #[test]
    fn only_saved_has_path() {
        let saved = MaterializeOutcome::Saved {
            path: "/afbeeldingen/a.png".into(),
        };
        assert_eq!(saved.into_path().as_deref(), Some("/afbeeldingen/a.png"));
        let rejected = MaterializeOutcome::Rejected {
            label: "document".into(),
            confidence: 0.9,
        };
        assert_eq!(rejected.into_path(), None);
    }
}
