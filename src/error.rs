//! Error types for the verkeersbesluit-ingest library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`IngestError`]: **Fatal** for the call that returns it: bad date
//!   input, misconfiguration, a PDF engine that cannot be loaded. Returned as
//!   `Err(IngestError)`.
//!
//! * [`RecordError`]: **Non-fatal**: a single search record was skipped
//!   (content unavailable, excluded by keyword) while every other record is
//!   still processed. Reported through
//!   [`crate::progress::IngestProgressCallback::on_record_skipped`].
//!
//! Rate limiting never surfaces here: the fetcher absorbs HTTP 429 into its
//! backoff loop and only reports the final outcome.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the verkeersbesluit-ingest library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The caller passed a value that can never succeed (e.g. a malformed date).
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    // ── Remote errors ─────────────────────────────────────────────────────
    /// A request could not be completed (DNS, connect, timeout, body read).
    #[error("Request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },

    /// A response body was not the XML we expected.
    #[error("Could not parse {context}: {detail}")]
    Parse { context: String, detail: String },

    // ── Attachment errors ─────────────────────────────────────────────────
    /// The classification collaborator signalled a failure.
    #[error("Image classification failed: {0}")]
    Classification(String),

    /// pdfium could not open or rasterise the attachment.
    #[error("Rasterisation failed: {detail}")]
    RasterisationFailed { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// The vision provider used by the classifier is not initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a rendered attachment image.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// `true` for errors caused by the caller's input rather than by the
    /// remote service or the local environment.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, IngestError::InvalidInput { .. })
    }
}

/// Why a single search record was left out of the result.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum RecordError {
    /// The document body could not be fetched.
    #[error("content fetch failed for '{url}'")]
    ContentFetchFailed { url: String },

    /// The document body mentions an exclusion keyword.
    #[error("excluded by keyword '{keyword}'")]
    Excluded { keyword: String },
}
