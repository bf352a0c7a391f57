mod common;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use common::{fast_config, numbered_samples};
use llm_bench_client::mock::MockInferenceClient;
use llm_bench_client::{InferenceError, InferenceResponse};
use llm_bench_core::*;
use llm_bench_workflow::*;

#[derive(Default)]
struct MemoryRepository {
    saved: Mutex<Vec<ExperimentResult>>,
}

#[async_trait]
impl ExperimentRepository for MemoryRepository {
    async fn save(&self, result: &ExperimentResult) -> Result<()> {
        self.saved.lock().await.push(result.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ExperimentId) -> Result<Option<ExperimentResult>> {
        Ok(self
            .saved
            .lock()
            .await
            .iter()
            .find(|r| &r.experiment_id == id)
            .cloned())
    }
}

struct ReadOnlyRepository;

#[async_trait]
impl ExperimentRepository for ReadOnlyRepository {
    async fn save(&self, _result: &ExperimentResult) -> Result<()> {
        Err(CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only file system",
        )))
    }

    async fn find_by_id(&self, _id: &ExperimentId) -> Result<Option<ExperimentResult>> {
        Ok(None)
    }
}

fn axes_2x2x2() -> SuiteAxes {
    SuiteAxes::new()
        .models(["model-a", "model-b"])
        .system_instructions(["Be terse.", "Be thorough."])
        .prompt_templates(["Extract the fields.", "Summarise the row."])
}

#[tokio::test]
async fn test_cartesian_suite_produces_distinct_experiments() {
    let mock = Arc::new(MockInferenceClient::always("ok"));
    let suite = SuiteRunner::new(ExperimentRunner::new(mock.clone())).with_experiment_concurrency(3);
    let task = TaskDefinition::new("t", numbered_samples(2));

    let result = suite
        .run_suite(&task, &axes_2x2x2(), &fast_config("unused", 0))
        .await;

    assert_eq!(result.planned, 8);
    assert_eq!(result.experiments.len(), 8);
    assert!(result.failures.is_empty());
    assert!(result.is_complete());

    let ids: HashSet<_> = result.experiments.iter().map(|e| e.experiment_id.clone()).collect();
    assert_eq!(ids.len(), 8);
    assert_eq!(mock.call_count(), 16);
}

#[tokio::test]
async fn test_failing_combination_does_not_stop_the_suite() {
    let mock = Arc::new(MockInferenceClient::new(|req| {
        if req.model_id == "flaky-model" {
            Err(InferenceError::Transient("503".into()))
        } else {
            Ok(InferenceResponse::text("ok"))
        }
    }));
    let suite = SuiteRunner::new(ExperimentRunner::new(mock));
    let task = TaskDefinition::new("t", numbered_samples(3));
    let axes = SuiteAxes::new().models(["flaky-model", "steady-model"]);

    let result = suite.run_suite(&task, &axes, &fast_config("unused", 1)).await;

    assert_eq!(result.experiments.len(), 2);
    let flaky = &result.experiments[0];
    assert_eq!(flaky.config.model_id, "flaky-model");
    assert_eq!(flaky.metrics.success_rate, 0.0);
    assert_eq!(flaky.sample_results.len(), 3);
    assert_eq!(result.experiments[1].metrics.success_rate, 1.0);
}

#[tokio::test]
async fn test_invalid_combination_is_recorded_as_failure() {
    let suite = SuiteRunner::new(ExperimentRunner::new(Arc::new(MockInferenceClient::always("ok"))));
    let task = TaskDefinition::new("t", numbered_samples(1));
    let axes = SuiteAxes::new().temperatures([0.0, 3.0]);

    let result = suite.run_suite(&task, &axes, &fast_config("m", 0)).await;

    assert_eq!(result.planned, 2);
    assert_eq!(result.experiments.len(), 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].config.temperature, 3.0);
    assert!(!result.is_complete());
}

#[tokio::test]
async fn test_results_are_saved_as_they_finish() {
    let repository = Arc::new(MemoryRepository::default());
    let suite = SuiteRunner::new(ExperimentRunner::new(Arc::new(MockInferenceClient::always("ok"))))
        .with_experiment_concurrency(4)
        .with_repository(repository.clone());
    let task = TaskDefinition::new("t", numbered_samples(1));

    let result = suite
        .run_suite(&task, &axes_2x2x2(), &fast_config("unused", 0))
        .await;

    assert_eq!(repository.saved.lock().await.len(), 8);
    for experiment in &result.experiments {
        let stored = repository.find_by_id(&experiment.experiment_id).await.unwrap();
        assert_eq!(stored.as_ref(), Some(experiment));
    }
}

#[tokio::test]
async fn test_store_errors_keep_the_result() {
    let suite = SuiteRunner::new(ExperimentRunner::new(Arc::new(MockInferenceClient::always("ok"))))
        .with_repository(Arc::new(ReadOnlyRepository));
    let task = TaskDefinition::new("t", numbered_samples(1));

    let result = suite
        .run_suite(&task, &SuiteAxes::new(), &fast_config("m", 0))
        .await;

    assert_eq!(result.experiments.len(), 1);
    assert!(result.experiments[0].is_complete());
    assert_eq!(result.failures.len(), 1);
    assert_eq!(
        result.failures[0].experiment_id.as_ref(),
        Some(&result.experiments[0].experiment_id)
    );
    assert!(result.failures[0].error.contains("failed to save experiment"));
    assert!(!result.is_complete());
}

#[tokio::test]
async fn test_cancelled_suite_runs_nothing_new() {
    let mock = Arc::new(MockInferenceClient::always("ok"));
    let mut suite = SuiteRunner::new(ExperimentRunner::new(mock.clone()));
    let mut events = suite.enable_progress_tracking();
    let task = TaskDefinition::new("t", numbered_samples(2));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = suite
        .run_suite_with_cancel(&task, &axes_2x2x2(), &fast_config("unused", 0), cancel)
        .await;

    assert_eq!(result.planned, 8);
    assert!(result.cancelled);
    assert!(result.experiments.is_empty());
    assert_eq!(mock.call_count(), 0);
    assert_eq!(
        events.try_recv().ok(),
        Some(RunEvent::SuitePlanned {
            task: "t".into(),
            planned: 8
        })
    );
}
