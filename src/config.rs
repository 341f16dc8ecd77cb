//! Configuration types for traffic-decision ingestion.
//!
//! All ingestion behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. The defaults reproduce the production
//! deployment against the KOOP repository (`repository.overheid.nl`).

use crate::error::IngestError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Keywords that mark a decision as out of scope (parking, charging points,
/// disabled-parking permits). Matched case-insensitively.
pub const DEFAULT_EXCLUDE_KEYWORDS: &[&str] = &[
    "parkeerplaats",
    "laadpaal",
    "gehandicapt",
    "oplaadpunt",
    "parkeerverbod",
    "parkeervergunning",
    "parkeerregime",
    "parkeermogelijkheden",
    "parkeervoorzieningen",
    "parkeersituatie",
    "parkeersituaties",
    "parkeerplaatsen",
    "parkeerplaatsvoorzieningen",
];

/// Upper bound for [`IngestConfig::max_rendered_pixels`].
pub const MAX_RENDERED_PIXELS_CAP: u32 = 32_768;

/// Configuration for an ingestion run.
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use verkeersbesluit_ingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .dpi(200)
///     .concurrency(4)
///     .images_dir("/srv/static/afbeeldingen")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// SRU search endpoint.
    pub sru_base_url: String,

    /// SRU protocol version sent as `version`. Default: "2.0".
    pub sru_version: String,

    /// SRU operation sent as `operation`. Default: "searchRetrieve".
    pub sru_operation: String,

    /// `maximumRecords` cap on the search request. Default: 900.
    pub max_records: u32,

    /// Base URL for external PDF attachments (`externebijlagen`).
    pub repository_base_url: String,

    /// Base URL embedded illustrations are resolved against.
    pub zoek_base_url: String,

    /// Keywords excluded both in the query and in the fetched body.
    pub exclude_keywords: Vec<String>,

    /// Per-request timeout. Default: 10 s.
    pub request_timeout: Duration,

    /// Minimum spacing between requests while throttled, and the first
    /// backoff step. Default: 2 s.
    pub request_delay: Duration,

    /// Retries after the first attempt. Default: 3.
    pub max_retries: u32,

    /// Exponential backoff multiplier. Default: 2.
    pub retry_multiplier: u32,

    /// Consecutive successes needed to leave the throttled state. Default: 5.
    pub successes_to_reset: u32,

    /// Rendering DPI for the first page of a PDF attachment. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Longest rendered edge in pixels, independent of DPI. Default: 8000.
    pub max_rendered_pixels: u32,

    /// A PDF download must be strictly larger than this to be rendered.
    /// Default: 50 000 bytes.
    pub min_pdf_size_bytes: usize,

    /// Directory rendered attachment images are written to.
    pub images_dir: PathBuf,

    /// Site-relative prefix under which `images_dir` is served. Default: "/afbeeldingen".
    pub public_prefix: String,

    /// Records processed at once. Default: 1 (sequential).
    pub concurrency: usize,

    /// Minimum classifier confidence for a positive verdict. Default: 0.5.
    pub min_confidence: f32,

    /// LLM model identifier for the vision classifier.
    pub model: Option<String>,

    /// LLM provider name for the vision classifier (e.g. "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Retries on a failed classifier call. Default: 2.
    pub classifier_max_retries: u32,

    /// Initial classifier retry delay in milliseconds. Default: 500.
    pub classifier_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sru_base_url: "https://repository.overheid.nl/sru".to_string(),
            sru_version: "2.0".to_string(),
            sru_operation: "searchRetrieve".to_string(),
            max_records: 900,
            repository_base_url: "https://repository.officiele-overheidspublicaties.nl"
                .to_string(),
            zoek_base_url: "https://zoek.officielebekendmakingen.nl".to_string(),
            exclude_keywords: DEFAULT_EXCLUDE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            request_timeout: Duration::from_secs(10),
            request_delay: Duration::from_secs(2),
            max_retries: 3,
            retry_multiplier: 2,
            successes_to_reset: 5,
            dpi: 300,
            max_rendered_pixels: 8000,
            min_pdf_size_bytes: 50_000,
            images_dir: PathBuf::from("afbeeldingen"),
            public_prefix: "/afbeeldingen".to_string(),
            concurrency: 1,
            min_confidence: 0.5,
            model: None,
            provider_name: None,
            provider: None,
            classifier_max_retries: 2,
            classifier_backoff_ms: 500,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("sru_base_url", &self.sru_base_url)
            .field("max_records", &self.max_records)
            .field("exclude_keywords", &self.exclude_keywords.len())
            .field("request_timeout", &self.request_timeout)
            .field("request_delay", &self.request_delay)
            .field("max_retries", &self.max_retries)
            .field("successes_to_reset", &self.successes_to_reset)
            .field("dpi", &self.dpi)
            .field("min_pdf_size_bytes", &self.min_pdf_size_bytes)
            .field("images_dir", &self.images_dir)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }

    /// The fetcher's retry and throttle knobs.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.request_timeout,
            base_delay: self.request_delay,
            max_retries: self.max_retries,
            multiplier: self.retry_multiplier,
            successes_to_reset: self.successes_to_reset,
        }
    }
}

/// Retry/backoff parameters of the rate-limited fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Default per-request timeout.
    pub timeout: Duration,
    /// Throttle spacing and first backoff step.
    pub base_delay: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff growth factor.
    pub multiplier: u32,
    /// Successes needed to clear the throttled flag.
    pub successes_to_reset: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        IngestConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    /// Wait before retry `attempt` (1-based): `base_delay * multiplier^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn sru_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.sru_base_url = url.into();
        self
    }

    pub fn max_records(mut self, n: u32) -> Self {
        self.config.max_records = n;
        self
    }

    pub fn repository_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.repository_base_url = url.into();
        self
    }

    pub fn zoek_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.zoek_base_url = url.into();
        self
    }

    pub fn exclude_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.exclude_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.config.request_delay = delay;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_multiplier(mut self, m: u32) -> Self {
        self.config.retry_multiplier = m.max(1);
        self
    }

    pub fn successes_to_reset(mut self, n: u32) -> Self {
        self.config.successes_to_reset = n.max(1);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.clamp(100, MAX_RENDERED_PIXELS_CAP);
        self
    }

    pub fn min_pdf_size_bytes(mut self, n: usize) -> Self {
        self.config.min_pdf_size_bytes = n;
        self
    }

    pub fn images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.images_dir = dir.into();
        self
    }

    pub fn public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.public_prefix = prefix.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn min_confidence(mut self, c: f32) -> Self {
        self.config.min_confidence = c.clamp(0.0, 1.0);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn classifier_max_retries(mut self, n: u32) -> Self {
        self.config.classifier_max_retries = n;
        self
    }

    pub fn classifier_backoff_ms(mut self, ms: u64) -> Self {
        self.config.classifier_backoff_ms = ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.request_timeout.is_zero() {
            return Err(IngestError::InvalidConfig(
                "Request timeout must be positive".into(),
            ));
        }
        if c.max_records == 0 {
            return Err(IngestError::InvalidConfig(
                "maximumRecords must be ≥ 1".into(),
            ));
        }
        if c.sru_base_url.is_empty() || c.repository_base_url.is_empty() {
            return Err(IngestError::InvalidConfig(
                "SRU and repository base URLs must be set".into(),
            ));
        }
        if !c.public_prefix.starts_with('/') {
            return Err(IngestError::InvalidConfig(format!(
                "Public prefix must start with '/', got '{}'",
                c.public_prefix
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let c = IngestConfig::default();
        assert_eq!(c.max_records, 900);
        assert_eq!(c.exclude_keywords.len(), 13);
        assert_eq!(c.request_timeout, Duration::from_secs(10));
        assert_eq!(c.dpi, 300);
        assert_eq!(c.min_pdf_size_bytes, 50_000);
    }

    #[test]
    fn backoff_grows_exponentially() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn builder_clamps_dpi_and_concurrency() {
        let c = IngestConfig::builder()
            .dpi(10)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_caps_rendered_pixels() {
        let c = IngestConfig::builder()
            .max_rendered_pixels(u32::MAX)
            .build()
            .unwrap();
        assert_eq!(c.max_rendered_pixels, MAX_RENDERED_PIXELS_CAP);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = IngestConfig::builder()
            .request_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)));
    }

    #[test]
    fn relative_public_prefix_rejected() {
        assert!(IngestConfig::builder()
            .public_prefix("afbeeldingen")
            .build()
            .is_err());
    }
}
