use crate::constants;
use crate::error::TransportError;
use crate::pipeline::message::{RawResponse, RequestDescription};
use crate::pipeline::Transport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff policy for [`RetryingTransport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Also retry 408, 429 and most 5xx responses, not only transport failures.
    pub retry_on_status: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter: true,
            retry_on_status: false,
        }
    }
}

/// Connect and receive limits for the HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub connect_timeout_ms: u64,
    pub receive_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: constants::DEFAULT_CONNECT_TIMEOUT_MS,
            receive_timeout_ms: constants::DEFAULT_RECEIVE_TIMEOUT_MS,
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Determines if a transport failure is worth another attempt
#[must_use]
pub fn is_retryable(error: &TransportError) -> bool {
    match error {
        TransportError::Connect(_) | TransportError::Timeout(_) => true,
        TransportError::Http(e) => e.is_connect() || e.is_timeout(),
        TransportError::InvalidRequest(_) | TransportError::Aborted(_) => false,
    }
}

/// Statuses a server may answer differently on a later attempt
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    match status {
        408 | 429 => true,
        // Exclude Not Implemented, HTTP Version not supported
        500..=599 => !matches!(status, 501 | 505),
        _ => false,
    }
}

impl RetryConfig {
    /// Pause before retry number `attempt` (zero based): exponential growth
    /// capped at `max_delay_ms`, plus up to 25% jitter when enabled.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn backoff(&self, attempt: usize) -> Duration {
        let growth = self.backoff_multiplier.powi(attempt.min(30) as i32);
        let capped = (self.initial_delay_ms as f64 * growth).min(self.max_delay_ms as f64);
        let spread = if self.jitter {
            fastrand::f64().mul_add(0.25, 1.0)
        } else {
            1.0
        };
        Duration::from_millis((capped * spread) as u64)
    }
}

/// Wraps a transport and repeats failed submissions with backoff.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    config: RetryConfig,
}

impl<T: Transport> RetryingTransport<T> {
    pub const fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryingTransport<T> {
    async fn submit(&self, request: &RequestDescription) -> Result<RawResponse, TransportError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let is_last_attempt = attempt + 1 >= attempts;
            match self.inner.submit(request).await {
                Ok(response)
                    if self.config.retry_on_status
                        && !is_last_attempt
                        && is_retryable_status(response.status) =>
                {
                    debug!(
                        target: constants::LOG_TARGET,
                        "HTTP {} from {}, retrying (attempt {}/{attempts})",
                        response.status,
                        request.uri,
                        attempt + 1
                    );
                }
                Ok(response) => return Ok(response),
                Err(error) if !is_last_attempt && is_retryable(&error) => {
                    warn!(
                        target: constants::LOG_TARGET,
                        "{error}, retrying {} (attempt {}/{attempts})",
                        request.uri,
                        attempt + 1
                    );
                }
                Err(error) => return Err(error),
            }
            sleep(self.config.backoff(attempt)).await;
            attempt += 1;
        }
    }
}

/// Creates an HTTP client with timeout configuration. Redirects are not
/// followed by the client; the invoker decides whether to follow them.
///
/// # Errors
/// Fails when the TLS backend cannot be initialised.
pub fn create_resilient_client(
    timeout_config: &TimeoutConfig,
) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .connect_timeout(timeout_config.connect_timeout())
        .timeout(timeout_config.receive_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| TransportError::InvalidRequest(format!("Failed to create HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multimap::MultiMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Flaky {
        async fn submit(&self, _request: &RequestDescription) -> Result<RawResponse, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(TransportError::Connect("refused".to_string()))
            } else {
                Ok(RawResponse::new(200))
            }
        }
    }

    fn request() -> RequestDescription {
        RequestDescription {
            method: "GET".to_string(),
            uri: "http://h/x".to_string(),
            headers: MultiMap::new(),
            body: None,
            timeout: None,
        }
    }

    fn fast_config(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            jitter: false,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let config = RetryConfig {
            initial_delay_ms: 50,
            max_delay_ms: 300,
            jitter: false,
            ..RetryConfig::default()
        };
        let delays: Vec<u128> = (0..5).map(|n| config.backoff(n).as_millis()).collect();
        assert_eq!(delays, vec![50, 100, 200, 300, 300]);
    }

    #[test]
    fn test_backoff_jitter_stays_within_quarter() {
        let config = RetryConfig {
            initial_delay_ms: 400,
            ..RetryConfig::default()
        };
        for _ in 0..20 {
            let millis = config.backoff(0).as_millis();
            assert!((400..=500).contains(&millis), "{millis}");
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&TransportError::Timeout("slow".to_string())));
        assert!(!is_retryable(&TransportError::InvalidRequest("bad".to_string())));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(501));
        assert!(!is_retryable_status(404));
    }

    #[tokio::test]
    async fn test_retrying_transport_recovers() {
        let transport = RetryingTransport::new(
            Flaky {
                failures: 2,
                calls: AtomicUsize::new(0),
            },
            fast_config(3),
        );
        let response = transport.submit(&request()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_transport_gives_up() {
        let transport = RetryingTransport::new(
            Flaky {
                failures: 5,
                calls: AtomicUsize::new(0),
            },
            fast_config(2),
        );
        assert!(matches!(
            transport.submit(&request()).await,
            Err(TransportError::Connect(_))
        ));
        assert_eq!(transport.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_timeout_durations() {
        let timeouts = TimeoutConfig {
            connect_timeout_ms: 250,
            receive_timeout_ms: 1500,
        };
        assert_eq!(timeouts.connect_timeout(), Duration::from_millis(250));
        assert_eq!(timeouts.receive_timeout(), Duration::from_secs_f64(1.5));
    }
}
