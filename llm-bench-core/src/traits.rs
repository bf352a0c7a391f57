use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{ExperimentId, ExperimentResult, GroundTruth, Sample};
use crate::error::Result;

/// Maps a model response to a score in `[0, 1]`, or `None` when the sample
/// cannot be scored.
pub trait Scorer: Send + Sync {
    /// Name recorded in logs.
    fn name(&self) -> &str;

    fn score(
        &self,
        prediction: &str,
        ground_truth: &GroundTruth,
        input: &Sample,
    ) -> Result<Option<f64>>;
}

/// Builds the user prompt for one sample.
pub trait PromptFormatter: Send + Sync {
    fn format(
        &self,
        template: &str,
        sample: &Sample,
        ground_truth: Option<&GroundTruth>,
        schema: Option<&Value>,
    ) -> String;
}

/// Rewrites the resolved system instructions for a task.
pub trait SystemInstructionsFormatter: Send + Sync {
    fn format(&self, instructions: &str) -> Result<String>;
}

/// Persistence for finished experiments.
#[async_trait]
pub trait ExperimentRepository: Send + Sync {
    async fn save(&self, result: &ExperimentResult) -> Result<()>;
    async fn find_by_id(&self, id: &ExperimentId) -> Result<Option<ExperimentResult>>;
}
