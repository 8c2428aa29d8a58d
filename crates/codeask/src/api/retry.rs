//! Automatic retry with exponential backoff and jitter.
//!
//! Only [`Error::is_retryable`](crate::Error::is_retryable) failures
//! (provider unavailable, rate limited) are retried. Auth, model-not-found and stream errors fail immediately.
//! Retry wraps the provider, so the ask loop itself never retries.

use std::time::Duration;

use tracing::warn;

use super::provider::{CompletionStream, ModelProvider, ProviderFuture};
use crate::{ChatCompletion, ChatRequest};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = no retries, just fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries. Uses sensible defaults.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Fixed jitter table keeps delays reproducible without an RNG.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Provider decorator that retries `chat_with_tools` on transient failures.
///
/// Streamed completions are not retried: a partially consumed stream can't
/// be replayed transparently.
pub struct RetryingProvider<P> {
    inner: P,
    config: RetryConfig,
}

impl<P: ModelProvider> RetryingProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: ModelProvider> ModelProvider for RetryingProvider<P> {
    fn chat_with_tools<'a>(&'a self, request: &'a ChatRequest) -> ProviderFuture<'a, ChatCompletion> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                match self.inner.chat_with_tools(request).await {
                    Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                        let delay = self.config.delay_for_attempt(attempt);
                        warn!(
                            "{} (attempt {}/{}), retrying in {:.1}s: {e}",
                            e.code(),
                            attempt + 1,
                            self.config.max_retries,
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    other => return other,
                }
            }
        })
    }

    fn stream_completion<'a>(&'a self, request: &'a ChatRequest) -> CompletionStream<'a> {
        self.inner.stream_completion(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_config_no_retries() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn with_retries_sets_count() {
        let config = RetryConfig::with_retries(3);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn delay_increases_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(5)
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);

        assert!(d1 > d0, "d1={d1:?} should be > d0={d0:?}");
        assert!(d2 > d1, "d2={d2:?} should be > d1={d1:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        assert!(config.delay_for_attempt(10) <= Duration::from_secs(2));
    }

    #[test]
    fn jitter_reduces_delay() {
        let with = RetryConfig::with_retries(3);
        let without = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(3)
        };
        assert!(with.delay_for_attempt(2) <= without.delay_for_attempt(2));
    }

    struct Flaky {
        calls: AtomicU32,
        fail_times: u32,
        error: fn() -> Error,
    }

    impl ModelProvider for Flaky {
        fn chat_with_tools<'a>(&'a self, _: &'a ChatRequest) -> ProviderFuture<'a, ChatCompletion> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = n < self.fail_times;
            let error = self.error;
            Box::pin(async move {
                if fail {
                    Err(error())
                } else {
                    Ok(ChatCompletion::text("ok"))
                }
            })
        }

        fn stream_completion<'a>(&'a self, _: &'a ChatRequest) -> CompletionStream<'a> {
            Box::pin(futures::stream::empty())
        }
    }

    fn fast(retries: u32) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryConfig::with_retries(retries)
        }
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let provider = RetryingProvider::new(
            Flaky {
                calls: AtomicU32::new(0),
                fail_times: 2,
                error: || Error::ProviderRateLimited { body: "429".into() },
            },
            fast(2),
        );
        let out = provider.chat_with_tools(&ChatRequest::default()).await.unwrap();
        assert_eq!(out.content.as_deref(), Some("ok"));
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let provider = RetryingProvider::new(
            Flaky {
                calls: AtomicU32::new(0),
                fail_times: 10,
                error: || Error::ProviderUnavailable { reason: "503".into() },
            },
            fast(1),
        );
        let err = provider.chat_with_tools(&ChatRequest::default()).await.unwrap_err();
        assert_eq!(err.code(), "PROVIDER_UNAVAILABLE");
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let provider = RetryingProvider::new(
            Flaky {
                calls: AtomicU32::new(0),
                fail_times: 10,
                error: || Error::ProviderAuthFailed { status: 401, body: String::new() },
            },
            fast(5),
        );
        assert!(provider.chat_with_tools(&ChatRequest::default()).await.is_err());
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);
    }
}
