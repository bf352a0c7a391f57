use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ground truth has {ground_truth} rows but task has {samples} samples")]
    PartialTaskMismatch { samples: usize, ground_truth: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        CoreError::Validation(err.to_string())
    }
}

// ===== Sample Failure Kinds =====

/// Failure tag recorded on a sample result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Transient,
    InvalidRequest,
    AuthFailure,
    ScoringFailure,
}

impl ErrorKind {
    /// Retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::Transient)
    }

    /// The endpoint rejected the configuration itself; no further sample of
    /// the same experiment can succeed.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, ErrorKind::InvalidRequest | ErrorKind::AuthFailure)
    }

    /// Whether the sample counts as a failed run in the success rate.
    /// Scoring failures keep the response and only lose the score.
    pub fn is_inference_failure(&self) -> bool {
        !matches!(self, ErrorKind::ScoringFailure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Transient => "transient",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::ScoringFailure => "scoring_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
