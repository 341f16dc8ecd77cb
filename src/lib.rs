//! # verkeersbesluit-ingest
//!
//! Collect the Dutch traffic decisions ("verkeersbesluiten") published on a
//! given day from the official-publications repository, normalise each into a
//! [`DocumentRecord`], and optionally turn attached PDF drawings into stored
//! map images.
//!
//! ## Pipeline Overview
//!
//! ```text
//! YYYY-MM-DD
//!  │
//!  ├─ 1. Query     exact-day CQL query, exclusion keywords applied
//!  ├─ 2. Search    rate-limited SRU request, record list extracted
//!  ├─ 3. Fetch     content + metadata per record, keyword post-filter
//!  ├─ 4. Parse     metadata map, plain text, image references
//!  └─ 5. Attach    first PDF page rendered, classified, stored if a map
//! ```
//!
//! Every request goes through one shared [`Fetcher`], so throttling and
//! backoff after HTTP 429 apply across the whole run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use verkeersbesluit_ingest::{Fetcher, IngestConfig, Ingestor, PdfMaterializer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::default();
//!     let fetcher = Arc::new(Fetcher::new(config.retry_policy())?);
//!     // Vision provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY
//!     let materializer = PdfMaterializer::from_config(&config, Arc::clone(&fetcher))?;
//!     let ingestor = Ingestor::with_fetcher(config, fetcher).with_materializer(materializer);
//!
//!     for record in ingestor.run_and_materialize("2024-05-01").await? {
//!         println!("{} ({} images)", record.id, record.images.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `besluiten` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! verkeersbesluit-ingest = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ingest;
pub mod materialize;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod query;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder, RetryPolicy, DEFAULT_EXCLUDE_KEYWORDS};
pub use error::{IngestError, RecordError};
pub use ingest::Ingestor;
pub use materialize::{MaterializeOutcome, PdfMaterializer};
pub use output::{AreaMarking, AttachmentStatus, DocumentRecord, ImageRef, MetadataMap, MetadataValue};
pub use pipeline::classify::{ClassificationVerdict, ImageClassifier, VisionClassifier};
pub use pipeline::fetch::{
    FetchOutcome, FetchStatus, Fetcher, HttpTransport, RateLimitState, RawResponse, ReqwestTransport,
};
pub use pipeline::records::RecordRef;
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
