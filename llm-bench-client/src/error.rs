//! Failure taxonomy for inference calls.
//!
//! Every transport failure is classified into one of four kinds. Only
//! rate limiting and transient failures are retried; the others are
//! properties of the request or credentials and would fail again.

use llm_bench_core::ErrorKind;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    AuthFailure(String),
}

pub type InferenceResult<T> = std::result::Result<T, InferenceError>;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

impl InferenceError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Transient(_) => ErrorKind::Transient,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::AuthFailure(_) => ErrorKind::AuthFailure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Server-requested wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classify a non-success HTTP response.
    ///
    /// The typed error body takes precedence over the status code so that,
    /// for example, an `overloaded_error` is transient whatever status it
    /// arrives with.
    pub fn from_response(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|e| e.error.message.clone())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    format!("HTTP {}: {}", status, body.trim())
                }
            });

        let by_type = parsed
            .as_ref()
            .and_then(|e| e.error.error_type.as_deref())
            .and_then(|error_type| match error_type {
                "rate_limit_error" => Some(Self::RateLimited {
                    message: message.clone(),
                    retry_after,
                }),
                "overloaded_error" | "api_error" | "timeout_error" => {
                    Some(Self::Transient(message.clone()))
                }
                "authentication_error" | "permission_error" => {
                    Some(Self::AuthFailure(message.clone()))
                }
                "invalid_request_error" | "not_found_error" | "request_too_large" => {
                    Some(Self::InvalidRequest(message.clone()))
                }
                _ => None,
            });
        if let Some(error) = by_type {
            return error;
        }

        match status {
            429 => Self::RateLimited {
                message,
                retry_after,
            },
            401 | 403 => Self::AuthFailure(message),
            408 | 409 | 500..=599 => Self::Transient(message),
            _ => Self::InvalidRequest(message),
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_response(status.as_u16(), "", None)
        } else {
            // timeouts, connection resets and truncated bodies
            Self::Transient(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(429, ErrorKind::RateLimited)]
    #[case(401, ErrorKind::AuthFailure)]
    #[case(403, ErrorKind::AuthFailure)]
    #[case(400, ErrorKind::InvalidRequest)]
    #[case(404, ErrorKind::InvalidRequest)]
    #[case(408, ErrorKind::Transient)]
    #[case(500, ErrorKind::Transient)]
    #[case(529, ErrorKind::Transient)]
    fn test_status_mapping(#[case] status: u16, #[case] expected: ErrorKind) {
        assert_eq!(InferenceError::from_response(status, "", None).kind(), expected);
    }

    #[test]
    fn test_error_type_overrides_status() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = InferenceError::from_response(400, body, None);
        assert_eq!(err, InferenceError::Transient("Overloaded".into()));

        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
        let err = InferenceError::from_response(400, body, Some(Duration::from_secs(3)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_message_from_plain_body() {
        let err = InferenceError::from_response(400, "bad model", None);
        assert_eq!(err.to_string(), "Invalid request: HTTP 400: bad model");
    }

    #[test]
    fn test_retryability() {
        assert!(InferenceError::rate_limited("x").is_retryable());
        assert!(InferenceError::Transient("x".into()).is_retryable());
        assert!(!InferenceError::InvalidRequest("x".into()).is_retryable());
        assert!(!InferenceError::AuthFailure("x".into()).is_retryable());
    }
}
