//! Retry decisions for inference attempts.
//!
//! The policy is a pure function of the attempt number, the failure and a
//! random sample in `[0, 1)` used for jitter, so every decision can be
//! tested without sleeping. [`RetryingClient`](crate::RetryingClient) owns
//! the loop that applies it.

use llm_bench_core::RetrySettings;
use std::time::Duration;

use crate::error::InferenceError;

/// Jitter strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Full jitter: random value between 0 and calculated delay
    #[default]
    Full,
    /// Equal jitter: half delay + random half
    Equal,
}

/// Result of one attempt, classified for the retry loop.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    RetryableFailure(InferenceError),
    TerminalFailure(InferenceError),
}

impl<T> AttemptOutcome<T> {
    pub fn from_result(result: Result<T, InferenceError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) if e.is_retryable() => Self::RetryableFailure(e),
            Err(e) => Self::TerminalFailure(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Exponential backoff bounded by a retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: JitterStrategy,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            multiplier: multiplier.max(1.0),
            jitter,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_retries,
            settings.initial_backoff(),
            settings.max_backoff(),
            settings.multiplier,
            if settings.jitter {
                JitterStrategy::Full
            } else {
                JitterStrategy::None
            },
        )
    }

    /// A single attempt with no retries.
    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO, 1.0, JitterStrategy::None)
    }

    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Upper bound on attempts for one call.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after failed attempt `attempt` (zero-based), before jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    /// Jittered delay; `random` is a uniform sample in `[0, 1)`.
    pub fn jittered_delay(&self, attempt: u32, random: f64) -> Duration {
        let delay = self.backoff_delay(attempt);
        let random = random.clamp(0.0, 1.0);
        match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => delay.mul_f64(random),
            JitterStrategy::Equal => {
                let half = delay / 2;
                half + half.mul_f64(random)
            }
        }
    }

    /// Decide what to do after attempt `attempt` (zero-based) failed.
    ///
    /// A server-supplied `retry_after` raises the delay but never lowers it.
    pub fn decide(&self, attempt: u32, error: &InferenceError, random: f64) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        let delay = self.jittered_delay(attempt, random);
        let delay = match error.retry_after() {
            Some(requested) => delay.max(requested),
            None => delay,
        };
        RetryDecision::RetryAfter(delay)
    }
}
