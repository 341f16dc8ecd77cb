//! The classification boundary that gates which attachment pages are kept.
//!
//! The pipeline only needs `classify(bytes) -> verdict`; anything that
//! implements [`ImageClassifier`] can be plugged in. [`VisionClassifier`] is
//! the bundled implementation: it shows the image to a vision LLM and asks for
//! a one-word label plus confidence.
//!
//! ## Retry Strategy
//!
//! Provider errors (429, 5xx, timeouts) are retried with exponential backoff
//! (`backoff_ms * 2^(attempt-1)`). A reply that is not a usable verdict is
//! not retried: asking again rarely fixes a model that ignored the format.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::encode::{sniff_mime, to_image_data};
use crate::prompts::{CLASSIFIER_SYSTEM_PROMPT, CLASSIFIER_USER_PROMPT, TARGET_LABELS};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Outcome of classifying one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationVerdict {
    /// `true` for maps and aerial photographs above the confidence floor.
    pub is_target_class: bool,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub label: String,
}

/// Decides whether an image is worth keeping.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Classify encoded image bytes (PNG or JPEG).
    ///
    /// `Err` means the collaborator could not produce a verdict.
    async fn classify(&self, image: &[u8]) -> Result<ClassificationVerdict, IngestError>;
}

#[derive(Debug, Deserialize)]
struct VerdictReply {
    label: String,
    confidence: f32,
}

/// Turn a model reply into a verdict. Tolerates code fences and prose around
/// the JSON object.
pub fn parse_verdict(reply: &str, min_confidence: f32) -> Result<ClassificationVerdict, IngestError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => {
            return Err(IngestError::Classification(format!(
                "reply contains no JSON object: {reply:?}"
            )))
        }
    };

    let parsed: VerdictReply = serde_json::from_str(json)
        .map_err(|e| IngestError::Classification(format!("unreadable verdict: {e}")))?;

    let label = parsed.label.trim().to_lowercase();
    let confidence = parsed.confidence.clamp(0.0, 1.0);
    let is_target_class =
        TARGET_LABELS.contains(&label.as_str()) && confidence >= min_confidence;

    Ok(ClassificationVerdict {
        is_target_class,
        confidence,
        label,
    })
}

/// [`ImageClassifier`] backed by a vision-capable LLM.
pub struct VisionClassifier {
    provider: Arc<dyn LLMProvider>,
    min_confidence: f32,
    max_retries: u32,
    backoff_ms: u64,
}

impl std::fmt::Debug for VisionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionClassifier")
            .field("provider", &"<dyn LLMProvider>")
            .field("min_confidence", &self.min_confidence)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl VisionClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>, min_confidence: f32) -> Self {
        Self {
            provider,
            min_confidence,
            max_retries: 0,
            backoff_ms: 500,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_ms = backoff_ms;
        self
    }

    /// Build from config, resolving the provider like the CLI does.
    pub fn from_config(config: &IngestConfig) -> Result<Self, IngestError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.min_confidence)
            .with_retries(config.classifier_max_retries, config.classifier_backoff_ms))
    }
}

#[async_trait]
impl ImageClassifier for VisionClassifier {
    async fn classify(&self, image: &[u8]) -> Result<ClassificationVerdict, IngestError> {
        let messages = vec![
            ChatMessage::system(CLASSIFIER_SYSTEM_PROMPT),
            ChatMessage::user_with_images(
                CLASSIFIER_USER_PROMPT,
                vec![to_image_data(image, sniff_mime(image))],
            ),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(64),
            ..Default::default()
        };

        let mut last_err = String::from("no attempt made");
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = retry_backoff(self.backoff_ms, attempt);
                warn!(
                    "Classifier retry {}/{} after {}ms",
                    attempt,
                    self.max_retries,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Classifier reply ({} input tokens): {}",
                        response.prompt_tokens,
                        response.content.trim()
                    );
                    return parse_verdict(&response.content, self.min_confidence);
                }
                Err(e) => {
                    last_err = e.to_string();
                    warn!("Classifier attempt {} failed: {}", attempt + 1, last_err);
                }
            }
        }

        Err(IngestError::Classification(last_err))
    }
}

/// `backoff_ms * 2^(attempt-1)`, saturating instead of overflowing.
fn retry_backoff(backoff_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(backoff_ms.saturating_mul(factor))
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, IngestError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        IngestError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`).
/// 2. **Named provider + model** (`config.provider_name`, model defaulting
///    to `gpt-4.1-nano`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &IngestConfig) -> Result<Arc<dyn LLMProvider>, IngestError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| IngestError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
