use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::ExperimentConfig;
use super::ids::{ConfigDigest, ExperimentId};
use super::task::{GroundTruth, Sample};
use crate::error::ErrorKind;

// ===== Sample Results =====

/// The model response after parsing: a structured value when an embedded
/// JSON block parsed, the raw text otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Prediction {
    Structured(Value),
    Text(String),
}

impl Prediction {
    pub fn is_structured(&self) -> bool {
        matches!(self, Prediction::Structured(_))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SampleError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of one sample within an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleResult {
    /// Position of the sample in the task's input order.
    pub index: usize,
    pub input: Sample,
    pub response: Option<String>,
    /// Extended reasoning trace, when thinking mode was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub prediction: Option<Prediction>,
    pub ground_truth: Option<GroundTruth>,
    pub score: Option<f64>,
    pub error: Option<SampleError>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub latency_ms: u64,
}

impl SampleResult {
    /// A sample whose inference call failed terminally.
    pub fn failed(
        index: usize,
        input: Sample,
        ground_truth: Option<GroundTruth>,
        error: SampleError,
        attempts: u32,
        latency_ms: u64,
    ) -> Self {
        Self {
            index,
            input,
            response: None,
            reasoning: None,
            prediction: None,
            ground_truth,
            score: None,
            error: Some(error),
            attempts,
            usage: None,
            latency_ms,
        }
    }

    /// False only when inference failed; a scoring failure still counts as
    /// a successful run.
    pub fn succeeded(&self) -> bool {
        self.error
            .as_ref()
            .map_or(true, |e| !e.kind.is_inference_failure())
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

// ===== Experiment Results =====

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExperimentMetrics {
    pub total_samples: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    /// Fraction of samples without an inference failure.
    pub success_rate: f64,
    pub num_scored: usize,
    /// Mean over scored samples only; `None` when nothing was scorable.
    pub average_score: Option<f64>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub median_score: Option<f64>,
    pub std_dev: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Stopped by a cancellation signal between samples.
    Cancelled,
    /// The endpoint rejected the configuration; remaining samples were skipped.
    Aborted { kind: ErrorKind, message: String },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentResult {
    pub experiment_id: ExperimentId,
    pub task_name: String,
    pub config: ExperimentConfig,
    pub config_digest: ConfigDigest,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: RunStatus,
    /// Number of samples in the task; more than `sample_results.len()` when
    /// the run stopped early.
    pub expected_samples: usize,
    pub sample_results: Vec<SampleResult>,
    pub metrics: ExperimentMetrics,
}

impl ExperimentResult {
    /// Every sample has a result and the run was not interrupted.
    pub fn is_complete(&self) -> bool {
        self.status.is_completed() && self.sample_results.len() == self.expected_samples
    }
}

// ===== Suite Results =====

/// A combination whose configuration was rejected, or whose result ran but
/// could not be saved. In the latter case `experiment_id` names the result,
/// which is still returned in [`SuiteResult::experiments`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteFailure {
    pub config: ExperimentConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<ExperimentId>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuiteResult {
    /// Size of the cartesian product, known before any experiment ran.
    pub planned: usize,
    pub experiments: Vec<ExperimentResult>,
    pub failures: Vec<SuiteFailure>,
    pub cancelled: bool,
}

impl SuiteResult {
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self.failures.is_empty()
            && self.experiments.len() == self.planned
            && self.experiments.iter().all(ExperimentResult::is_complete)
    }

    pub fn find(&self, id: &ExperimentId) -> Option<&ExperimentResult> {
        self.experiments.iter().find(|e| &e.experiment_id == id)
    }
}
