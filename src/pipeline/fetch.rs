//! Rate-limited HTTP GET with adaptive throttling and bounded retries.
//!
//! The upstream repository answers bursts with HTTP 429. The [`Fetcher`]
//! reacts in two ways:
//!
//! * **Backoff**: every retry waits `base_delay * multiplier^(attempt-1)`
//!   before it is issued (2 s → 4 s → 8 s with the defaults). A 429 with a
//!   `Retry-After` header additionally waits the server-provided seconds.
//! * **Throttle**: the first 429 switches the shared [`RateLimitState`] into
//!   throttled mode, in which every new request keeps at least `base_delay`
//!   between itself and the previous one. Throttling ends after
//!   `successes_to_reset` consecutive 2xx responses.
//!
//! Only 429 and transport errors are retried. Any other non-2xx response is
//! returned immediately as [`FetchStatus::Failed`].
//!
//! The state lives inside the `Fetcher` behind a `tokio::sync::Mutex`; share
//! one `Arc<Fetcher>` across every caller that should be throttled together.

use crate::config::RetryPolicy;
use crate::error::IngestError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// A raw HTTP response as seen by the fetcher.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// The wire underneath the fetcher.
///
/// An `Err` means no HTTP response was received at all (DNS, connect,
/// timeout); any status code, including errors, is an `Ok`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<RawResponse, IngestError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("verkeersbesluit-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use an existing client (shared connection pool, proxies, …).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<RawResponse, IngestError> {
        let transport_err = |e: reqwest::Error| IngestError::Transport {
            url: url.to_string(),
            reason: if e.is_timeout() {
                format!("timed out after {}s", timeout.as_secs_f32())
            } else {
                e.to_string()
            },
        };

        let response = self
            .client
            .get(url)
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(transport_err)?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// Terminal classification of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    /// Every attempt was answered with 429.
    RateLimited,
    Failed,
}

/// The answer the fetcher settled on.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: FetchStatus,
    pub http_status: Option<u16>,
    pub body: Option<Vec<u8>>,
    pub headers: HashMap<String, String>,
}

impl FetchOutcome {
    fn from_response(status: FetchStatus, response: RawResponse) -> Self {
        Self {
            status,
            http_status: Some(response.status),
            body: Some(response.body),
            headers: response.headers,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    /// Response body, empty if none was kept.
    pub fn body(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body.unwrap_or_default()
    }
}

/// Adaptive throttle bookkeeping shared by every request of one [`Fetcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub is_throttled: bool,
    pub last_request_time: Option<Instant>,
    pub consecutive_successes: u32,
}

impl RateLimitState {
    /// Book the next send slot while throttled and return how long to wait
    /// for it. The slot is recorded as `last_request_time` right away, so
    /// concurrent callers queue up `spacing` apart.
    fn reserve_slot(&mut self, now: Instant, spacing: Duration) -> Option<Duration> {
        if !self.is_throttled {
            return None;
        }
        let slot = match self.last_request_time {
            Some(last) => (last + spacing).max(now),
            None => now,
        };
        self.last_request_time = Some(slot);
        let wait = slot - now;
        (!wait.is_zero()).then_some(wait)
    }

    /// Record a finished request; never moves a booked slot backwards.
    fn mark_request(&mut self, at: Instant) {
        self.last_request_time = Some(self.last_request_time.map_or(at, |last| last.max(at)));
    }

    /// Returns `true` when this 429 switched throttling on.
    fn record_rate_limited(&mut self) -> bool {
        self.consecutive_successes = 0;
        !std::mem::replace(&mut self.is_throttled, true)
    }

    /// Returns `true` when this success switched throttling off.
    fn record_success(&mut self, successes_to_reset: u32) -> bool {
        self.consecutive_successes += 1;
        if self.is_throttled && self.consecutive_successes >= successes_to_reset {
            self.is_throttled = false;
            self.consecutive_successes = 0;
            return true;
        }
        false
    }

    fn record_failure(&mut self) {
        self.consecutive_successes = 0;
    }
}

/// HTTP GET with retry, backoff and adaptive throttling.
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    state: Mutex<RateLimitState>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// A fetcher over a fresh reqwest client.
    pub fn new(policy: RetryPolicy) -> Result<Self, IngestError> {
        Ok(Self::with_transport(Arc::new(ReqwestTransport::new()?), policy))
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            state: Mutex::new(RateLimitState::default()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Snapshot of the throttle state.
    pub async fn state(&self) -> RateLimitState {
        *self.state.lock().await
    }

    /// Plain GET with the policy's default timeout.
    pub async fn get(&self, url: &str) -> Option<FetchOutcome> {
        self.fetch(url, &[], self.policy.timeout).await
    }

    /// GET `url` with query `params`, retrying per the [`RetryPolicy`].
    ///
    /// Returns `None` when no HTTP response was obtained after the last
    /// attempt. Never returns an error: every failure is an outcome.
    pub async fn fetch(
        &self,
        url: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Option<FetchOutcome> {
        let max_retries = self.policy.max_retries;
        let mut last_rate_limited: Option<RawResponse> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay = self.policy.backoff(attempt);
                info!(
                    "Retry attempt {}: waiting {:.1}s",
                    attempt,
                    delay.as_secs_f32()
                );
                sleep(delay).await;
            } else {
                let wait = self
                    .state
                    .lock()
                    .await
                    .reserve_slot(Instant::now(), self.policy.base_delay);
                if let Some(wait) = wait {
                    info!(
                        "Rate limiting active: waiting {:.1}s",
                        wait.as_secs_f32()
                    );
                    sleep(wait).await;
                }
            }

            debug!(url = %url, attempt, "Requesting");
            let result = self.transport.get(url, params, timeout).await;

            let mut state = self.state.lock().await;
            state.mark_request(Instant::now());

            match result {
                Ok(response) if response.status == 429 => {
                    if state.record_rate_limited() {
                        warn!("First 429 detected: rate limiting now active");
                    }
                    drop(state);

                    match retry_after(&response.headers) {
                        Some(wait) => {
                            warn!(
                                "Rate limited (429). Waiting {}s as per Retry-After",
                                wait.as_secs()
                            );
                            sleep(wait).await;
                        }
                        None => warn!("Rate limited (429). Using exponential backoff"),
                    }
                    last_rate_limited = Some(response);
                }
                Ok(response) if (200..300).contains(&response.status) => {
                    debug!(url = %url, status = response.status, "Request successful");
                    if state.record_success(self.policy.successes_to_reset) {
                        info!(
                            "Rate limiting disabled after {} successful requests",
                            self.policy.successes_to_reset
                        );
                    }
                    return Some(FetchOutcome::from_response(FetchStatus::Success, response));
                }
                Ok(response) => {
                    state.record_failure();
                    warn!(url = %url, status = response.status, "Request failed");
                    return Some(FetchOutcome::from_response(FetchStatus::Failed, response));
                }
                Err(e) => {
                    state.record_failure();
                    error!("Request error (attempt {}): {}", attempt + 1, e);
                    if attempt == max_retries {
                        error!("All {} attempts failed for {}", max_retries + 1, url);
                        return None;
                    }
                }
            }
        }

        warn!(url = %url, "Still rate limited after {} attempts", max_retries + 1);
        last_rate_limited.map(|r| FetchOutcome::from_response(FetchStatus::RateLimited, r))
    }
}

/// Server-provided wait in whole seconds; HTTP-date values fall back to backoff.
fn retry_after(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
