//! Shared blocking HTTP plumbing: client construction, retry with
//! exponential backoff, and a circuit breaker per remote API.
//!
//! A 403 trips the breaker immediately. Repeated 429s or 5xx trip it after a
//! threshold. While tripped, every request fails fast until the cooldown
//! expires.

use std::time::{Duration, Instant};

use edgeloop_core::ports::{FeedError, MarketError, ModelError};
use parking_lot::Mutex;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("unreachable: {0}")]
    Network(String),

    #[error("rate limited (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("not found")]
    NotFound,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("circuit breaker open")]
    CircuitOpen,
}

impl From<HttpError> for FeedError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Network(m) => FeedError::NetworkUnreachable(m),
            HttpError::RateLimited { retry_after_secs } => FeedError::RateLimited { retry_after_secs },
            HttpError::Decode(m) => FeedError::ResponseFormatChanged(m),
            other => FeedError::Other(other.to_string()),
        }
    }
}

impl From<HttpError> for MarketError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Network(m) => MarketError::NetworkUnreachable(m),
            HttpError::RateLimited { retry_after_secs } => {
                MarketError::RateLimited { retry_after_secs }
            }
            HttpError::Decode(m) => MarketError::ResponseFormatChanged(m),
            other => MarketError::Other(other.to_string()),
        }
    }
}

impl From<HttpError> for ModelError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Decode(m) => ModelError::ResponseFormatChanged(m),
            other => ModelError::Unreachable(other.to_string()),
        }
    }
}

pub fn build_client(timeout: Duration) -> Result<Client, HttpError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("edgeloop/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| HttpError::Network(format!("failed to build HTTP client: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { tripped_at: Instant },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Five consecutive failures trip it for one minute.
    pub fn for_polling() -> Self {
        Self::new(Duration::from_secs(60), 5)
    }

    pub fn is_allowed(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { tripped_at } if tripped_at.elapsed() >= self.cooldown => {
                *state = BreakerState::Closed { failures: 0 };
                true
            }
            BreakerState::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        *self.state.lock() = BreakerState::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        if let BreakerState::Closed { failures } = *state {
            let failures = failures + 1;
            *state = if failures >= self.failure_threshold {
                BreakerState::Open {
                    tripped_at: Instant::now(),
                }
            } else {
                BreakerState::Closed { failures }
            };
        }
    }

    pub fn trip(&self) {
        *self.state.lock() = BreakerState::Open {
            tripped_at: Instant::now(),
        };
    }

    pub fn remaining_cooldown(&self) -> Duration {
        match *self.state.lock() {
            BreakerState::Closed { .. } => Duration::ZERO,
            BreakerState::Open { tripped_at } => self.cooldown.saturating_sub(tripped_at.elapsed()),
        }
    }
}

/// Retry policy for one API.
#[derive(Debug)]
pub struct Retrying {
    pub breaker: CircuitBreaker,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Retrying {
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self {
            breaker,
            max_retries: 2,
            base_delay: Duration::from_millis(250),
        }
    }

    /// Send the request built by `build` and decode a JSON body, retrying
    /// transient failures. `build` is called once per attempt.
    pub fn send_json<T, F>(&self, what: &str, build: F) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        if !self.breaker.is_allowed() {
            return Err(HttpError::CircuitOpen);
        }

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.base_delay * 2u32.pow(attempt - 1));
                if !self.breaker.is_allowed() {
                    return Err(HttpError::CircuitOpen);
                }
            }

            let resp = match build().send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    self.breaker.record_failure();
                    last_error = Some(HttpError::Network(e.to_string()));
                    continue;
                }
                Err(e) => return Err(HttpError::Network(e.to_string())),
            };

            let status = resp.status();
            if status == StatusCode::FORBIDDEN {
                self.breaker.trip();
                return Err(HttpError::Status(status.as_u16()));
            }
            if status == StatusCode::NOT_FOUND {
                return Err(HttpError::NotFound);
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                self.breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(5);
                last_error = Some(HttpError::RateLimited { retry_after_secs });
                continue;
            }
            if status.is_server_error() {
                self.breaker.record_failure();
                last_error = Some(HttpError::Status(status.as_u16()));
                continue;
            }
            if !status.is_success() {
                return Err(HttpError::Status(status.as_u16()));
            }

            let body = resp
                .json::<T>()
                .map_err(|e| HttpError::Decode(format!("{what}: {e}")))?;
            self.breaker.record_success();
            return Ok(body);
        }

        debug!(what, "retries exhausted");
        Err(last_error.unwrap_or(HttpError::Status(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        assert!(cb.is_allowed());
        assert_eq!(cb.remaining_cooldown(), Duration::ZERO);
    }

    #[test]
    fn trips_after_threshold_failures() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_allowed());
        cb.record_failure();
        assert!(!cb.is_allowed());
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 2);
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.is_allowed());
    }

    #[test]
    fn cooldown_expiry_closes() {
        let cb = CircuitBreaker::new(Duration::from_millis(1), 1);
        cb.trip();
        std::thread::sleep(Duration::from_millis(10));
        assert!(cb.is_allowed());
    }

    #[test]
    fn open_breaker_fails_fast() {
        let retrying = Retrying::new(CircuitBreaker::new(Duration::from_secs(60), 1));
        retrying.breaker.trip();
        let client = Client::new();
        let err = retrying
            .send_json::<serde_json::Value, _>("test", || client.get("http://127.0.0.1:9/"))
            .unwrap_err();
        assert!(matches!(err, HttpError::CircuitOpen));
    }
}
