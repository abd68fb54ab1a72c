//! Retrying Generator
//!
//! Wraps any [`TextGenerator`] with a per-attempt timeout and a fixed-delay
//! retry policy. Errors classified as non-retryable (auth, bad request,
//! token limit) are returned after the first attempt.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use tracing::warn;

use super::provider::{GenerationRequest, LlmResponse, TextGenerator};
use crate::config::Config;
use crate::types::{PcfError, Result};

/// Attempts, spacing and per-attempt deadline for outbound calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per call, first try included (minimum 1)
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
    /// Deadline for a single attempt
    pub request_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry.max_attempts.max(1),
            delay: config.retry.delay(),
            request_timeout: Duration::from_secs(config.llm.timeout_secs),
        }
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Execute an async operation with a timeout
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(PcfError::timeout(operation_name, timeout)),
    }
}

/// [`TextGenerator`] decorator applying a [`RetryPolicy`]
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: TextGenerator> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<LlmResponse> {
        with_timeout(
            self.policy.request_timeout,
            self.inner.generate(request),
            self.inner.name(),
        )
        .await
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for RetryingGenerator<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<LlmResponse> {
        let provider = self.inner.name();

        (move || self.attempt(request))
            .retry(self.policy.backoff())
            .when(|e: &PcfError| e.is_retryable())
            .notify(|e: &PcfError, wait: Duration| {
                warn!(
                    provider,
                    error = %e,
                    wait_ms = wait.as_millis() as u64,
                    "Generation attempt failed, retrying"
                );
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::Turn;
    use crate::types::{ErrorCategory, LlmError};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the queued errors, then succeeds
    struct FlakyGenerator {
        failures: Mutex<Vec<PcfError>>,
        calls: AtomicU32,
        hang: bool,
    }

    impl FlakyGenerator {
        fn new(failures: Vec<PcfError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: AtomicU32::new(0),
                hang: false,
            }
        }
    }

    #[async_trait]
    impl TextGenerator for FlakyGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            let next = self.failures.lock().unwrap().pop();
            match next {
                Some(err) => Err(err),
                None => Ok(LlmResponse::text_only("done")),
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }

        fn model(&self) -> &str {
            "flaky-1"
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(1),
        }
    }

    fn transient() -> PcfError {
        LlmError::new(ErrorCategory::Transient, "overloaded").into()
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("sys", vec![Turn::user("hello")])
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(2));
        assert_eq!(policy.request_timeout, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let generator =
            RetryingGenerator::new(FlakyGenerator::new(vec![transient(), transient()]), policy(3));

        let response = generator.generate(&request()).await.unwrap();
        assert_eq!(response.text, "done");
        assert_eq!(generator.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let generator = RetryingGenerator::new(
            FlakyGenerator::new(vec![transient(), transient(), transient()]),
            policy(3),
        );

        assert!(generator.generate(&request()).await.is_err());
        assert_eq!(generator.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let auth: PcfError = LlmError::new(ErrorCategory::Auth, "bad key").into();
        let generator = RetryingGenerator::new(FlakyGenerator::new(vec![auth]), policy(3));

        let err = generator.generate(&request()).await.unwrap_err();
        assert!(matches!(err, PcfError::Llm(ref e) if e.category == ErrorCategory::Auth));
        assert_eq!(generator.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let generator = RetryingGenerator::new(FlakyGenerator::new(vec![transient()]), policy(1));

        assert!(generator.generate(&request()).await.is_err());
        assert_eq!(generator.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let mut inner = FlakyGenerator::new(vec![]);
        inner.hang = true;
        let generator = RetryingGenerator::new(
            inner,
            RetryPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(1),
                request_timeout: Duration::from_millis(20),
            },
        );

        let err = generator.generate(&request()).await.unwrap_err();
        assert!(matches!(err, PcfError::Timeout { .. }));
        assert_eq!(generator.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, PcfError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
