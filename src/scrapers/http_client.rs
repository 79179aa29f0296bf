//! HTTP client for the archive with retry, backoff, and identification.
//!
//! Every request carries the contact User-Agent the archive's access
//! policy requires and passes through the shared rate limiter. Transient
//! failures retry with exponential backoff up to a ceiling; the ceiling
//! surfaces as `FetchError::RetriesExhausted` with the last cause.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::rate_limiter::RateLimiter;
use crate::error::FetchError;

/// Build the identifying User-Agent the archive requires.
/// The archive rejects anonymous clients, so the contact email is baked in.
pub fn contact_user_agent(contact_email: &str) -> String {
    format!(
        "edgaracquire/{} (research; {})",
        env!("CARGO_PKG_VERSION"),
        contact_email
    )
}

/// HTTP client with rate limiting and retrying GETs.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpClient {
    /// Create a new HTTP client identified by the given contact email.
    pub fn new(
        contact_email: &str,
        timeout: Duration,
        rate_limiter: RateLimiter,
        max_retries: u32,
    ) -> Self {
        let client = Client::builder()
            .user_agent(contact_user_agent(contact_email))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            rate_limiter,
            max_retries,
            backoff_base: Duration::from_millis(500),
        }
    }

    /// Override the backoff base (tests use a short one).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Get the rate limiter for this client.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Make a GET request, retrying transient failures with exponential
    /// backoff. Returns the response body as bytes.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut last_error: Option<reqwest::Error> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                debug!(url, attempt, "retrying after {:?}", backoff);
                tokio::time::sleep(backoff).await;
            }

            self.rate_limiter.acquire().await;

            let response = match self.client.get(url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    // Timeouts and connection failures are transient
                    warn!(url, attempt, error = %e, "request failed");
                    last_error = Some(e);
                    continue;
                }
            };

            let status = response.status();
            match status {
                StatusCode::NOT_FOUND => {
                    return Err(FetchError::NotFound {
                        url: url.to_string(),
                    });
                }
                StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                    self.rate_limiter.report_rate_limit(status.as_u16()).await;
                    last_error = response.error_for_status().err();
                    continue;
                }
                // The archive answers 403 to clients it is throttling
                StatusCode::FORBIDDEN => {
                    self.rate_limiter.report_rate_limit(status.as_u16()).await;
                    last_error = response.error_for_status().err();
                    continue;
                }
                _ if status.is_server_error() => {
                    self.rate_limiter.report_server_error().await;
                    last_error = response.error_for_status().err();
                    continue;
                }
                _ if status.is_client_error() => {
                    return Err(FetchError::MalformedResponse {
                        url: url.to_string(),
                        reason: format!("unexpected status {status}"),
                    });
                }
                _ => {}
            }

            self.rate_limiter.report_success().await;
            return match response.bytes().await {
                Ok(bytes) => Ok(bytes.to_vec()),
                Err(e) => {
                    // Body read failures (reset mid-stream) count as transient
                    warn!(url, attempt, error = %e, "body read failed");
                    last_error = Some(e);
                    continue;
                }
            };
        }

        match last_error {
            Some(last) => Err(FetchError::RetriesExhausted {
                attempts: self.max_retries,
                last,
            }),
            // Unreachable with max_retries >= 1; be explicit rather than panic
            None => Err(FetchError::MalformedResponse {
                url: url.to_string(),
                reason: "no attempts were made".to_string(),
            }),
        }
    }

    /// Get page content as text (lossy UTF-8; filings are ASCII-heavy).
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Get and deserialize a JSON document.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, FetchError> {
        let bytes = self.get_bytes(url).await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::MalformedResponse {
            url: url.to_string(),
            reason: format!("invalid JSON: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_contact() {
        let ua = contact_user_agent("research@example.edu");
        assert!(ua.starts_with("edgaracquire/"));
        assert!(ua.contains("research@example.edu"));
    }
}
