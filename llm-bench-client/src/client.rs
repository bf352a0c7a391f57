use async_trait::async_trait;
use llm_bench_core::{ExperimentConfig, TokenUsage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capabilities;
use crate::error::{InferenceError, InferenceResult};
use crate::retry::{AttemptOutcome, RetryDecision, RetryPolicy};

// ===== Requests and Responses =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThinkingConfig {
    pub budget_tokens: u32,
}

/// One fully formatted inference call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceRequest {
    pub model_id: String,
    pub system_instructions: Option<String>,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub thinking: Option<ThinkingConfig>,
}

impl InferenceRequest {
    pub fn from_config(
        config: &ExperimentConfig,
        system_instructions: Option<String>,
        prompt: String,
    ) -> Self {
        Self {
            model_id: config.model_id.clone(),
            system_instructions: system_instructions.filter(|s| !s.trim().is_empty()),
            prompt,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            thinking: config.thinking.then_some(ThinkingConfig {
                budget_tokens: config.thinking_budget_tokens,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InferenceResponse {
    pub text: String,
    /// Concatenated thinking blocks, when thinking mode was on.
    pub reasoning: Option<String>,
    pub usage: Option<TokenUsage>,
    pub stop_reason: Option<String>,
}

impl InferenceResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

// ===== Transport Seam =====

/// A single inference attempt against some endpoint. Implementations must
/// not retry; [`RetryingClient`] owns that.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> InferenceResult<InferenceResponse>;

    fn supports_thinking(&self, model_id: &str) -> bool {
        capabilities::supports_thinking(model_id)
    }
}

// ===== Retrying Client =====

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub response: InferenceResponse,
    pub attempts: u32,
}

/// The last error once retries are exhausted, a terminal failure occurred,
/// or the call was cancelled while waiting to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceFailure {
    pub error: InferenceError,
    pub attempts: u32,
    /// Retries were abandoned because of a cancellation signal.
    pub cancelled: bool,
}

impl InferenceFailure {
    fn new(error: InferenceError, attempts: u32) -> Self {
        Self {
            error,
            attempts,
            cancelled: false,
        }
    }
}

impl fmt::Display for InferenceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            write!(f, "{} (cancelled after {} attempts)", self.error, self.attempts)
        } else {
            write!(f, "{} (after {} attempts)", self.error, self.attempts)
        }
    }
}

impl std::error::Error for InferenceFailure {}

/// Applies a [`RetryPolicy`] and a per-attempt deadline to an
/// [`InferenceClient`]. A timed-out attempt counts as a transient failure
/// and consumes a retry.
#[derive(Clone)]
pub struct RetryingClient {
    inner: Arc<dyn InferenceClient>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn InferenceClient>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }

    pub fn for_config(inner: Arc<dyn InferenceClient>, config: &ExperimentConfig) -> Self {
        Self::new(inner, RetryPolicy::from_settings(&config.retry), config.timeout())
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Reject requests the endpoint is known not to accept, without a call.
    pub fn preflight(&self, request: &InferenceRequest) -> InferenceResult<()> {
        if request.thinking.is_some() && !self.inner.supports_thinking(&request.model_id) {
            return Err(InferenceError::InvalidRequest(format!(
                "model {} does not support extended thinking",
                request.model_id
            )));
        }
        Ok(())
    }

    pub async fn invoke(&self, request: &InferenceRequest) -> Result<Completion, InferenceFailure> {
        self.invoke_with_cancel(request, &CancellationToken::new()).await
    }

    /// Like [`invoke`](Self::invoke), but no attempt is dispatched once
    /// `cancel` fires. An attempt already in flight runs to completion or
    /// timeout; a pending backoff is cut short and the last error returned.
    pub async fn invoke_with_cancel(
        &self,
        request: &InferenceRequest,
        cancel: &CancellationToken,
    ) -> Result<Completion, InferenceFailure> {
        if let Err(error) = self.preflight(request) {
            return Err(InferenceFailure::new(error, 0));
        }

        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, self.inner.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(InferenceError::Transient(format!(
                    "request timed out after {:?}",
                    self.timeout
                ))),
            };

            let error = match AttemptOutcome::from_result(result) {
                AttemptOutcome::Success(response) => {
                    if attempt > 0 {
                        debug!(model = %request.model_id, attempts = attempt + 1, "Inference succeeded after retries");
                    }
                    return Ok(Completion {
                        response,
                        attempts: attempt + 1,
                    });
                }
                AttemptOutcome::TerminalFailure(error) => {
                    return Err(InferenceFailure::new(error, attempt + 1));
                }
                AttemptOutcome::RetryableFailure(error) => error,
            };

            let delay = match self.policy.decide(attempt, &error, rand::random::<f64>()) {
                RetryDecision::RetryAfter(delay) => delay,
                RetryDecision::GiveUp => {
                    warn!(model = %request.model_id, error = %error, "Retries exhausted");
                    return Err(InferenceFailure::new(error, attempt + 1));
                }
            };

            if cancel.is_cancelled() {
                return Err(self.abandon(request, error, attempt + 1));
            }
            warn!(
                model = %request.model_id,
                attempt = attempt + 1,
                max_attempts = self.policy.max_attempts(),
                error = %error,
                "Retrying inference in {:?}",
                delay
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(self.abandon(request, error, attempt + 1));
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn abandon(&self, request: &InferenceRequest, error: InferenceError, attempts: u32) -> InferenceFailure {
        debug!(model = %request.model_id, attempts, "Retry abandoned after cancellation");
        InferenceFailure {
            error,
            attempts,
            cancelled: true,
        }
    }
}

impl fmt::Debug for RetryingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingClient")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockInferenceClient;
    use crate::retry::JitterStrategy;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(1),
            Duration::from_millis(5),
            2.0,
            JitterStrategy::None,
        )
    }

    fn request(model: &str, thinking: bool) -> InferenceRequest {
        let config = ExperimentConfig::builder(model)
            .thinking(thinking)
            .build()
            .unwrap();
        InferenceRequest::from_config(&config, Some("  ".into()), "hi".into())
    }

    #[test]
    fn test_request_from_config() {
        let req = request("claude-sonnet-4-20250514", true);
        assert_eq!(req.system_instructions, None);
        assert_eq!(
            req.thinking,
            Some(ThinkingConfig {
                budget_tokens: llm_bench_core::DEFAULT_THINKING_BUDGET_TOKENS
            })
        );
    }

    #[tokio::test]
    async fn test_transient_then_success_counts_attempts() {
        let mock = Arc::new(MockInferenceClient::sequence(vec![
            Err(InferenceError::Transient("reset".into())),
            Err(InferenceError::rate_limited("busy")),
            Ok(InferenceResponse::text("ok")),
        ]));
        let client = RetryingClient::new(mock.clone(), fast_policy(3), Duration::from_secs(5));

        let completion = client.invoke(&request("m", false)).await.unwrap();
        assert_eq!(completion.response.text, "ok");
        assert_eq!(completion.attempts, 3);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_last_error() {
        let mock = Arc::new(MockInferenceClient::failing(InferenceError::Transient(
            "down".into(),
        )));
        let client = RetryingClient::new(mock.clone(), fast_policy(2), Duration::from_secs(5));

        let failure = client.invoke(&request("m", false)).await.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.error.kind(), llm_bench_core::ErrorKind::Transient);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let mock = Arc::new(MockInferenceClient::failing(InferenceError::AuthFailure(
            "bad key".into(),
        )));
        let client = RetryingClient::new(mock.clone(), fast_policy(3), Duration::from_secs(5));

        let failure = client.invoke(&request("m", false)).await.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_thinking_on_unsupported_model_skips_call() {
        let mock = Arc::new(MockInferenceClient::always("ok"));
        let client = RetryingClient::new(mock.clone(), fast_policy(3), Duration::from_secs(5));

        let failure = client
            .invoke(&request("claude-3-5-sonnet-20241022", true))
            .await
            .unwrap_err();
        assert_eq!(failure.error.kind(), llm_bench_core::ErrorKind::InvalidRequest);
        assert_eq!(failure.attempts, 0);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let mock = Arc::new(MockInferenceClient::sequence(vec![
            Err(InferenceError::Transient("reset".into())),
            Ok(InferenceResponse::text("ok")),
        ]));
        let policy = RetryPolicy::new(
            3,
            Duration::from_secs(30),
            Duration::from_secs(30),
            2.0,
            JitterStrategy::None,
        );
        let client = RetryingClient::new(mock.clone(), policy, Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let failure = client
            .invoke_with_cancel(&request("m", false), &cancel)
            .await
            .unwrap_err();
        assert!(failure.cancelled);
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.error.kind(), llm_bench_core::ErrorKind::Transient);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_a_single_attempt() {
        let mock = Arc::new(MockInferenceClient::failing(InferenceError::rate_limited(
            "busy",
        )));
        let client = RetryingClient::new(mock.clone(), fast_policy(3), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = client
            .invoke_with_cancel(&request("m", false), &cancel)
            .await
            .unwrap_err();
        assert!(failure.cancelled);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_consumes_a_retry() {
        let mock = Arc::new(
            MockInferenceClient::always("late").with_delay(Duration::from_secs(60)),
        );
        let client = RetryingClient::new(mock.clone(), fast_policy(1), Duration::from_secs(1));

        let failure = client.invoke(&request("m", false)).await.unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert!(failure.error.to_string().contains("timed out"));
    }
}
