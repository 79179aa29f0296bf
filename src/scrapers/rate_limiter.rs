//! Adaptive rate limiter for the archive host.
//!
//! Enforces a minimum spacing between outbound requests and adapts the
//! delay based on responses: backs off on 429/503, gradually recovers on
//! success. The limiter is an explicitly shared handle (cloning shares
//! state), so a test can pause the tokio clock and assert exact pacing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for rate limiting behavior.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum spacing between requests (the archive's access policy).
    pub min_interval: Duration,
    /// Maximum delay (ceiling for backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff on rate limit.
    pub backoff_multiplier: f64,
    /// Multiplier for recovery on success (< 1.0 to decrease delay).
    pub recovery_multiplier: f64,
    /// Number of consecutive successes before reducing delay.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.5,
            recovery_threshold: 5,
        }
    }
}

#[derive(Debug)]
struct LimiterState {
    current_delay: Duration,
    last_request: Option<Instant>,
    consecutive_successes: u32,
    in_backoff: bool,
    total_requests: u64,
    rate_limit_hits: u64,
}

/// Shared request pacer. Cloning returns a handle to the same state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<LimiterState>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default config.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config.
    pub fn with_config(config: RateLimitConfig) -> Self {
        let state = LimiterState {
            current_delay: config.min_interval,
            last_request: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Wait until the next request is allowed, then mark it started.
    ///
    /// Holding the lock across the sleep serializes concurrent callers,
    /// which is exactly the pacing guarantee: no two requests are ever
    /// closer together than the current delay.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        if let Some(last) = state.last_request {
            let ready_at = last + state.current_delay;
            let now = Instant::now();
            if ready_at > now {
                debug!("rate limiting: waiting {:?}", ready_at - now);
                tokio::time::sleep_until(ready_at).await;
            }
        }
        state.last_request = Some(Instant::now());
        state.total_requests += 1;
    }

    /// Report a successful request - may decrease delay.
    pub async fn report_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_successes += 1;

        if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
            let new_delay = Duration::from_secs_f64(
                state.current_delay.as_secs_f64() * self.config.recovery_multiplier,
            );
            state.current_delay = new_delay.max(self.config.min_interval);

            if state.current_delay <= self.config.min_interval {
                state.in_backoff = false;
                debug!("recovered from rate limit backoff");
            } else {
                debug!("delay reduced to {:?}", state.current_delay);
            }
            state.consecutive_successes = 0;
        }
    }

    /// Report a rate limit hit (429 or 503) - increases delay.
    pub async fn report_rate_limit(&self, status_code: u16) {
        let mut state = self.state.lock().await;
        state.rate_limit_hits += 1;
        state.consecutive_successes = 0;
        state.in_backoff = true;

        let new_delay = Duration::from_secs_f64(
            state.current_delay.as_secs_f64() * self.config.backoff_multiplier,
        );
        state.current_delay = new_delay.min(self.config.max_delay);

        warn!(
            "rate limited by archive (HTTP {}), backing off to {:?}",
            status_code, state.current_delay
        );
    }

    /// Report a server error (5xx other than 503) - mild backoff.
    pub async fn report_server_error(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_successes = 0;
        let new_delay = Duration::from_secs_f64(state.current_delay.as_secs_f64() * 1.5);
        state.current_delay = new_delay.min(self.config.max_delay);
        debug!("server error, delay increased to {:?}", state.current_delay);
    }

    /// Current statistics.
    pub async fn stats(&self) -> RateLimiterStats {
        let state = self.state.lock().await;
        RateLimiterStats {
            current_delay: state.current_delay,
            in_backoff: state.in_backoff,
            total_requests: state.total_requests,
            rate_limit_hits: state.rate_limit_hits,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics snapshot.
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn requests_never_closer_than_min_interval() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            min_interval: Duration::from_millis(100),
            ..Default::default()
        });

        let mut timestamps = Vec::new();
        for _ in 0..5 {
            limiter.acquire().await;
            timestamps.push(Instant::now());
        }

        for pair in timestamps.windows(2) {
            assert!(
                pair[1] - pair[0] >= Duration::from_millis(100),
                "requests spaced {:?} apart",
                pair[1] - pair[0]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquirers_are_serialized() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            min_interval: Duration::from_millis(100),
            ..Default::default()
        });

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn backoff_on_rate_limit_and_recovery() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            min_interval: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.25,
            recovery_threshold: 2,
            ..Default::default()
        });

        limiter.report_rate_limit(429).await;
        let stats = limiter.stats().await;
        assert_eq!(stats.current_delay, Duration::from_millis(200));
        assert!(stats.in_backoff);
        assert_eq!(stats.rate_limit_hits, 1);

        limiter.report_success().await;
        limiter.report_success().await;
        let stats = limiter.stats().await;
        assert!(!stats.in_backoff);
        assert_eq!(stats.current_delay, Duration::from_millis(100));
    }
}
