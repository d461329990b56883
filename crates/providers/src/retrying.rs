//! Transport retry: per-request timeouts with bounded retries.
//!
//! Wraps another provider. Each request is bounded by a timeout; timeouts and
//! HTTP 502 answers are retried with a short backoff (4s, then 8s). Every
//! timeout is reported to the caller's [`TimeoutNotifier`] together with
//! whether another request will follow. All other errors, rate limiting
//! included, propagate immediately.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use steward_core::error::ProviderError;
use steward_core::message::Message;
use steward_core::provider::*;
use tracing::{debug, warn};

/// A provider that retries transient transport failures of an inner provider.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    timeout: Duration,
    attempts: u32,
}

impl RetryingProvider {
    /// Wrap `inner` with the default policy (40s timeout, 3 attempts).
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            inner,
            timeout: Duration::from_secs(40),
            attempts: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total requests per call; values below 1 are treated as 1.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Sleep before retry number `attempt + 1`.
    fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt + 2).min(8))
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
        notifier: Option<&dyn TimeoutNotifier>,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            let last = attempt + 1 >= self.attempts;

            match tokio::time::timeout(self.timeout, self.inner.complete(request.clone(), None)).await
            {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) if e.is_bad_gateway() && !last => {
                    warn!(
                        provider = %self.inner.name(),
                        attempt = attempt + 1,
                        error = %e,
                        "Bad gateway, retrying"
                    );
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        provider = %self.inner.name(),
                        attempt = attempt + 1,
                        timeout_secs = self.timeout.as_secs(),
                        "Request timed out"
                    );
                    if let Some(notifier) = notifier {
                        notifier.on_request_timeout(!last).await;
                    }
                    if last {
                        return Err(ProviderError::Timeout(format!(
                            "No response from '{}' after {} attempts of {}s",
                            self.inner.name(),
                            self.attempts,
                            self.timeout.as_secs()
                        )));
                    }
                }
            }

            let backoff = Self::backoff(attempt);
            debug!(backoff_secs = backoff.as_secs(), "Waiting before retry");
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    fn count_tokens(&self, messages: &[Message], model: &str) -> usize {
        self.inner.count_tokens(messages, model)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
