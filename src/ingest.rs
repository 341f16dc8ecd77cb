//! Day-level ingestion: search, fetch, filter, parse, locate.
//!
//! [`Ingestor::run`] processes exactly one date. Only a malformed date is an
//! error; a failed search or an empty day both yield an empty list, and a
//! failure on one record never affects the others.
//!
//! ```text
//! date ──▶ validate ──▶ SRU search ──▶ records ──┬─▶ content ──▶ keyword filter
//!                                               │       │
//!                                               │       ├─▶ metadata (optional)
//!                                               │       └─▶ locate images
//!                                               └─▶ DocumentRecord (search order)
//! ```
//!
//! PDF attachments are left as [`ImageRef::ExternalPdf`] by `run`;
//! [`Ingestor::materialize_attachments`] (or [`Ingestor::run_and_materialize`])
//! resolves them afterwards.

use crate::config::IngestConfig;
use crate::error::{IngestError, RecordError};
use crate::materialize::{MaterializeOutcome, PdfMaterializer};
use crate::output::{AttachmentStatus, DocumentRecord, ImageRef, MetadataMap};
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::locate::locate_images;
use crate::pipeline::metadata::parse_metadata;
use crate::pipeline::records::{extract_plain_text, extract_records, RecordRef};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::query::{build_query, search_params, validate_date};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Drives the ingestion pipeline for one date at a time.
pub struct Ingestor {
    config: IngestConfig,
    fetcher: Arc<Fetcher>,
    materializer: Option<PdfMaterializer>,
    progress: ProgressCallback,
}

impl Ingestor {
    /// An ingestor over a fresh reqwest-backed fetcher, without materializer.
    pub fn new(config: IngestConfig) -> Result<Self, IngestError> {
        let fetcher = Arc::new(Fetcher::new(config.retry_policy())?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Share an existing fetcher (and with it, its throttle state).
    pub fn with_fetcher(config: IngestConfig, fetcher: Arc<Fetcher>) -> Self {
        Self {
            config,
            fetcher,
            materializer: None,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    pub fn with_materializer(mut self, materializer: PdfMaterializer) -> Self {
        self.materializer = Some(materializer);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    /// Fetch and normalise every traffic decision published on `date`.
    ///
    /// # Errors
    /// Only [`IngestError::InvalidInput`] when `date` is not a `YYYY-MM-DD`
    /// calendar day.
    pub async fn run(&self, date: &str) -> Result<Vec<DocumentRecord>, IngestError> {
        validate_date(date)?;
        let start = Instant::now();
        info!("Processing date: {}", date);

        let query = build_query(date, &self.config.exclude_keywords);
        let params = search_params(&self.config, query);
        let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let body = match self
            .fetcher
            .fetch(&self.config.sru_base_url, &params, self.config.request_timeout)
            .await
        {
            Some(outcome) if outcome.is_success() => outcome.into_body(),
            _ => {
                warn!("Failed to get SRU data for {}", date);
                return Ok(Vec::new());
            }
        };

        let records = match extract_records(&body) {
            Ok(records) => records,
            Err(e) => {
                error!("Search response for {} unusable: {}", date, e);
                return Ok(Vec::new());
            }
        };

        let total = records.len();
        info!("Found {} records for {}", total, date);
        self.progress.on_run_start(date, total);

        let keywords: Vec<String> = self
            .config
            .exclude_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();

        let documents: Vec<DocumentRecord> = stream::iter(
            records
                .iter()
                .enumerate()
                .map(|(i, record)| self.process_record(i + 1, total, record, &keywords)),
        )
        .buffered(self.config.concurrency)
        .filter_map(|doc| async move { doc })
        .collect()
        .await;

        self.progress.on_run_complete(total, documents.len());
        info!(
            "Process for {} complete. Found {} items in {}ms",
            date,
            documents.len(),
            start.elapsed().as_millis()
        );
        Ok(documents)
    }

    /// [`run`](Self::run), then resolve PDF attachments when a materializer
    /// is configured.
    pub async fn run_and_materialize(&self, date: &str) -> Result<Vec<DocumentRecord>, IngestError> {
        let mut documents = self.run(date).await?;
        if self.materializer.is_some() {
            self.materialize_attachments(&mut documents).await?;
        }
        Ok(documents)
    }

    /// Resolve every record whose first image is a pending PDF attachment.
    ///
    /// A stored page replaces `images[0]`; any other outcome empties the
    /// record's `images`. Returns how many pages were stored.
    ///
    /// # Errors
    /// [`IngestError::InvalidConfig`] when no materializer is configured.
    pub async fn materialize_attachments(
        &self,
        documents: &mut [DocumentRecord],
    ) -> Result<usize, IngestError> {
        let materializer = self.materializer.as_ref().ok_or_else(|| {
            IngestError::InvalidConfig("no PDF materializer configured".into())
        })?;

        stream::iter(documents.iter_mut())
            .for_each_concurrent(self.config.concurrency, |doc| async move {
                let Some(code) = doc.pending_exb_code().map(str::to_string) else {
                    return;
                };
                let outcome = materializer.materialize_detailed(&code, &doc.id).await;
                apply_outcome(doc, outcome);
            })
            .await;

        Ok(documents
            .iter()
            .filter(|d| matches!(d.attachment, Some(AttachmentStatus::Saved { .. })))
            .count())
    }

    /// Blocking wrapper around [`run_and_materialize`](Self::run_and_materialize).
    ///
    /// Must not be called from within an async runtime.
    pub fn run_sync(&self, date: &str) -> Result<Vec<DocumentRecord>, IngestError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.run_and_materialize(date))
    }

    async fn process_record(
        &self,
        index: usize,
        total: usize,
        record: &RecordRef,
        keywords: &[String],
    ) -> Option<DocumentRecord> {
        self.progress.on_record_start(index, total);
        debug!("Processing document: {}", record.content_url);

        let content = match self.fetcher.get(&record.content_url).await {
            Some(outcome) if outcome.is_success() => {
                String::from_utf8_lossy(outcome.body()).into_owned()
            }
            _ => {
                warn!("Skipping {}: content unavailable", record.content_url);
                self.skip(
                    index,
                    total,
                    RecordError::ContentFetchFailed {
                        url: record.content_url.clone(),
                    },
                );
                return None;
            }
        };

        // Raw markup first, then the decoded text: character references such
        // as `&#108;aadpaal` only spell a keyword once decoded.
        let text = extract_plain_text(&content);
        let excluded = find_excluded_keyword(&content, keywords)
            .or_else(|| find_excluded_keyword(&text, keywords));
        if let Some(keyword) = excluded {
            info!("Document {} excluded on keyword '{}'", record.content_url, keyword);
            self.skip(
                index,
                total,
                RecordError::Excluded {
                    keyword: keyword.to_string(),
                },
            );
            return None;
        }

        let metadata = match record.metadata_url.as_deref() {
            Some(url) => self.fetch_metadata(url).await,
            None => MetadataMap::new(),
        };

        let images = locate_images(&content, &metadata, &self.config.zoek_base_url);
        let attachment = images
            .first()
            .filter(|i| i.is_external_pdf())
            .map(|_| AttachmentStatus::Pending);

        let document = DocumentRecord {
            id: record.document_id(),
            text,
            metadata,
            images,
            attachment,
        };
        self.progress
            .on_record_complete(index, total, &document.id, document.images.len());
        Some(document)
    }

    /// Metadata is best-effort: any failure degrades to an empty map.
    async fn fetch_metadata(&self, url: &str) -> MetadataMap {
        match self.fetcher.get(url).await {
            Some(outcome) if outcome.is_success() => match parse_metadata(outcome.body()) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Ignoring metadata from {}: {}", url, e);
                    MetadataMap::new()
                }
            },
            _ => {
                warn!("Metadata unavailable at {}", url);
                MetadataMap::new()
            }
        }
    }

    fn skip(&self, index: usize, total: usize, reason: RecordError) {
        self.progress.on_record_skipped(index, total, &reason);
    }
}

/// First exclusion keyword (already lower-cased) occurring in `content`,
/// ignoring case.
pub fn find_excluded_keyword<'k>(content: &str, keywords: &'k [String]) -> Option<&'k str> {
    let haystack = content.to_lowercase();
    keywords
        .iter()
        .find(|k| !k.is_empty() && haystack.contains(k.as_str()))
        .map(String::as_str)
}

fn apply_outcome(doc: &mut DocumentRecord, outcome: MaterializeOutcome) {
    match outcome {
        MaterializeOutcome::Saved { path } => {
            info!("PDF converted to image for {}: {}", doc.id, path);
            doc.images[0] = ImageRef::Materialized { path: path.clone() };
            doc.attachment = Some(AttachmentStatus::Saved { path });
        }
        MaterializeOutcome::Rejected { label, confidence } => {
            info!("PDF skipped for {} (not a map/aerial photo), images removed", doc.id);
            doc.images.clear();
            doc.attachment = Some(AttachmentStatus::Rejected { label, confidence });
        }
        MaterializeOutcome::Unavailable { reason } => {
            info!("PDF unavailable for {}, images removed", doc.id);
            doc.images.clear();
            doc.attachment = Some(AttachmentStatus::Unavailable { reason });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.into(),
            text: String::new(),
            metadata: MetadataMap::new(),
            images: vec![
                ImageRef::ExternalPdf {
                    exb_code: "exb-1".into(),
                },
                ImageRef::Embedded {
                    url: "https://zoek/x.png".into(),
                },
            ],
            attachment: Some(AttachmentStatus::Pending),
        }
    }

    #[test]
    fn keyword_match_ignores_case() {
        let keywords = vec!["laadpaal".to_string(), "gehandicapt".to_string()];
        assert_eq!(
            find_excluded_keyword("Plaatsing van een LAADPAAL", &keywords),
            Some("laadpaal")
        );
        assert_eq!(find_excluded_keyword("Afsluiting Hoofdweg", &keywords), None);
    }

    #[test]
    fn saved_outcome_replaces_first_image_only() {
        let mut doc = pending("gmb-1");
        apply_outcome(
            &mut doc,
            MaterializeOutcome::Saved {
                path: "/afbeeldingen/gmb-1_page_1_bijlage.png".into(),
            },
        );
        assert_eq!(doc.images.len(), 2);
        assert_eq!(
            doc.images[0],
            ImageRef::Materialized {
                path: "/afbeeldingen/gmb-1_page_1_bijlage.png".into()
            }
        );
    }

    #[test]
    fn rejected_outcome_empties_images() {
        let mut doc = pending("gmb-1");
        apply_outcome(
            &mut doc,
            MaterializeOutcome::Rejected {
                label: "document".into(),
                confidence: 0.8,
            },
        );
        assert!(doc.images.is_empty());
        assert!(matches!(
            doc.attachment,
            Some(AttachmentStatus::Rejected { .. })
        ));
    }
}
