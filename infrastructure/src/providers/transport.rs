//! HTTP transport shared by the OpenAI-compatible clients.
//!
//! Sends JSON POST requests and retries transient failures: connection
//! errors, timeouts and the 429/500/502/503/504 statuses. Backoff starts at
//! the configured delay and doubles on every further retry.

use corsie_application::GatewayError;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP statuses that are retried before being reported.
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Longest error body excerpt kept when the body is not JSON.
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry.min(16)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// A reqwest client plus the retry policy applied to every request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpTransport {
    pub fn new(policy: RetryPolicy) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, policy })
    }

    /// POST a JSON body with bearer auth, returning the first successful
    /// response.
    pub async fn post_json(
        &self,
        url: &str,
        api_key: &str,
        headers: &[(&'static str, String)],
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut retry = 0;
        loop {
            let mut request = self.client.post(url).bearer_auth(api_key).json(body);
            for (name, value) in headers {
                request = request.header(*name, value);
            }

            let can_retry = retry < self.policy.max_retries;
            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    if can_retry && RETRY_STATUSES.contains(&status) {
                        warn!(url, status, retry, "Retrying provider request");
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        return Err(status_error(status, &text));
                    }
                }
                Err(e) if can_retry && (e.is_connect() || e.is_timeout()) => {
                    warn!(url, error = %e, retry, "Retrying provider request");
                }
                Err(e) => return Err(GatewayError::Transport(e.to_string())),
            }

            let delay = self.policy.backoff(retry);
            debug!(?delay, "Backing off");
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}

/// Map a non-success response to a gateway error.
pub(crate) fn status_error(status: u16, body: &str) -> GatewayError {
    let message = error_message(body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            corsie_domain::util::truncate_str(body.trim(), MAX_ERROR_BODY).to_string()
        }
    });

    match status {
        401 | 403 => GatewayError::Authentication(message),
        429 => GatewayError::RateLimited(message),
        500..=599 => GatewayError::Transport(format!("HTTP {status}: {message}")),
        _ => GatewayError::upstream(Some(status), message),
    }
}

/// Extract `error.message` (or a top-level `message`) from a JSON error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|error| error.get("message").or(Some(error)))
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}
