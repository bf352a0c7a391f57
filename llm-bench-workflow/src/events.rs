use llm_bench_core::{ExperimentId, ExperimentMetrics, RunStatus};
use serde::{Deserialize, Serialize};

/// Progress published by the runners on a broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    SuitePlanned {
        task: String,
        planned: usize,
    },
    ExperimentStarted {
        experiment_id: ExperimentId,
        task: String,
        model_id: String,
        samples: usize,
    },
    SampleCompleted {
        experiment_id: ExperimentId,
        index: usize,
        succeeded: bool,
        score: Option<f64>,
    },
    ExperimentFinished {
        experiment_id: ExperimentId,
        task: String,
        status: RunStatus,
        metrics: ExperimentMetrics,
    },
    /// The combination never produced a result (invalid config or a store error).
    ExperimentFailed {
        task: String,
        model_id: String,
        error: String,
    },
}
