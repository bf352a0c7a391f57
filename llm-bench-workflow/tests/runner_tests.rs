mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_config, numbered_samples, prompt_has_id, text_task};
use llm_bench_client::mock::MockInferenceClient;
use llm_bench_client::{InferenceError, InferenceResponse};
use llm_bench_core::*;
use llm_bench_workflow::*;
use pretty_assertions::assert_eq;
use rstest::rstest;

// ===== Partial Failure Tolerance =====

#[tokio::test]
async fn test_result_count_matches_samples_despite_failures() {
    let mock = Arc::new(MockInferenceClient::new(|req| {
        if prompt_has_id(&req.prompt, 1) || prompt_has_id(&req.prompt, 3) {
            Err(InferenceError::Transient("connection reset".into()))
        } else {
            Ok(InferenceResponse::text("ok"))
        }
    }));
    let runner = ExperimentRunner::new(mock.clone());
    let task = TaskDefinition::new("t", numbered_samples(5));

    let result = runner.run(&task, &fast_config("m", 1)).await.unwrap();

    assert_eq!(result.sample_results.len(), 5);
    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.is_complete());
    assert_eq!(result.metrics.successful_runs, 3);
    assert_eq!(result.metrics.failed_runs, 2);
    assert_eq!(result.metrics.success_rate, 0.6);
}

#[tokio::test]
async fn test_exhausted_retries_record_error_and_continue() {
    let mock = Arc::new(MockInferenceClient::new(|req| {
        if prompt_has_id(&req.prompt, 0) {
            Err(InferenceError::rate_limited("throttled"))
        } else {
            Ok(InferenceResponse::text("family history"))
        }
    }));
    let runner = ExperimentRunner::new(mock.clone()).with_sample_concurrency(1);
    let task = text_task("t", &[Some("family history"), Some("family history")]);

    let result = runner.run(&task, &fast_config("m", 2)).await.unwrap();

    let failed = &result.sample_results[0];
    assert_eq!(failed.error_kind(), Some(ErrorKind::RateLimited));
    assert_eq!(failed.score, None);
    assert_eq!(failed.prediction, None);
    assert_eq!(failed.attempts, 3);

    let next = &result.sample_results[1];
    assert!(next.succeeded());
    assert_eq!(next.score, Some(1.0));
    // three attempts for the first sample, one for the second
    assert_eq!(mock.call_count(), 4);
}

// ===== Ordering =====

#[tokio::test(start_paused = true)]
async fn test_results_keep_input_order_under_concurrency() {
    // earlier samples take longer, so completion order is reversed
    let mock = Arc::new(MockInferenceClient::echo().with_delay_fn(|req| {
        let id = (0..8).find(|i| prompt_has_id(&req.prompt, *i)).unwrap_or(0);
        Duration::from_millis(100 * (8 - id as u64))
    }));
    let runner = ExperimentRunner::new(mock).with_sample_concurrency(8);
    let task = TaskDefinition::new("t", numbered_samples(8));

    let result = runner.run(&task, &fast_config("m", 0)).await.unwrap();

    let indices: Vec<usize> = result.sample_results.iter().map(|r| r.index).collect();
    assert_eq!(indices, (0..8).collect::<Vec<_>>());
    for (i, sample) in result.sample_results.iter().enumerate() {
        assert_eq!(sample.input.get("id"), Some(&serde_json::json!(i)));
        assert!(prompt_has_id(sample.response.as_deref().unwrap(), i));
    }
}

// ===== Scoring =====

#[tokio::test]
async fn test_average_excludes_unscorable_samples() {
    let mock = Arc::new(MockInferenceClient::always("family history"));
    let runner = ExperimentRunner::new(mock);
    let task = text_task(
        "t",
        &[
            Some("family history"),
            None,
            Some("family history of cancer"),
        ],
    );

    let result = runner.run(&task, &fast_config("m", 0)).await.unwrap();

    let scores: Vec<Option<f64>> = result.sample_results.iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![Some(1.0), None, Some(0.5)]);
    assert_eq!(result.metrics.total_samples, 3);
    assert_eq!(result.metrics.num_scored, 2);
    assert_eq!(result.metrics.average_score, Some(0.75));
}

#[tokio::test]
async fn test_structured_response_is_parsed_and_field_scored() {
    let mock = Arc::new(MockInferenceClient::always(
        "Sure:\n```json\n{\"a\": \"x\", \"b\": \"y\"}\n```",
    ));
    let runner = ExperimentRunner::new(mock);
    let task = TaskDefinition::new("t", numbered_samples(1))
        .with_ground_truth(vec![GroundTruth::new(serde_json::json!({"a": "x", "b": "z"}))])
        .unwrap();

    let result = runner.run(&task, &fast_config("m", 0)).await.unwrap();

    let sample = &result.sample_results[0];
    assert_eq!(
        sample.prediction,
        Some(Prediction::Structured(serde_json::json!({"a": "x", "b": "y"})))
    );
    assert_eq!(sample.score, Some(0.5));
}

struct FailingScorer;

impl Scorer for FailingScorer {
    fn name(&self) -> &str {
        "failing"
    }

    fn score(&self, _: &str, _: &GroundTruth, _: &Sample) -> Result<Option<f64>> {
        Err(CoreError::Internal("lookup table missing".into()))
    }
}

#[tokio::test]
async fn test_scoring_failure_keeps_sample_successful() {
    let mock = Arc::new(MockInferenceClient::always("anything"));
    let runner = ExperimentRunner::new(mock);
    let task = text_task("t", &[Some("x"), Some("y")]).with_scorer(Arc::new(FailingScorer));

    let result = runner.run(&task, &fast_config("m", 0)).await.unwrap();

    for sample in &result.sample_results {
        assert_eq!(sample.error_kind(), Some(ErrorKind::ScoringFailure));
        assert_eq!(sample.score, None);
        assert_eq!(sample.response.as_deref(), Some("anything"));
    }
    assert_eq!(result.metrics.success_rate, 1.0);
    assert_eq!(result.metrics.average_score, None);
}

// ===== Prompt and Instructions =====

struct ConstantFormatter;

impl PromptFormatter for ConstantFormatter {
    fn format(
        &self,
        template: &str,
        _sample: &Sample,
        _ground_truth: Option<&GroundTruth>,
        _schema: Option<&serde_json::Value>,
    ) -> String {
        format!("custom: {}", template)
    }
}

#[tokio::test]
async fn test_registered_formatter_and_task_instructions_reach_the_request() {
    let mock = Arc::new(MockInferenceClient::always("ok"));
    let runner = ExperimentRunner::new(mock.clone());

    let mut registry = TaskRegistry::new();
    registry.register_formatter("t", Arc::new(ConstantFormatter));
    let task = registry.resolve(
        TaskDefinition::new("t", numbered_samples(2))
            .with_prompt_template("Extract.")
            .with_system_instructions("task instructions"),
    );

    runner.run(&task, &fast_config("m", 0)).await.unwrap();

    for request in mock.requests() {
        assert_eq!(request.prompt, "custom: Extract.");
        assert_eq!(request.system_instructions.as_deref(), Some("task instructions"));
    }
}

#[tokio::test]
async fn test_config_template_overrides_task_default() {
    let mock = Arc::new(MockInferenceClient::echo());
    let runner = ExperimentRunner::new(mock).with_default_system_instructions("fallback");
    let task = TaskDefinition::new("t", numbered_samples(1));
    let config = ExperimentConfig::builder("m")
        .prompt_template("Override.")
        .max_retries(0)
        .build()
        .unwrap();

    let result = runner.run(&task, &config).await.unwrap();

    let response = result.sample_results[0].response.clone().unwrap();
    assert!(response.starts_with("Override.\n\nInput data:\n"));
}

// ===== Aborts and Cancellation =====

#[rstest]
#[case::auth(InferenceError::AuthFailure("invalid x-api-key".into()), ErrorKind::AuthFailure)]
#[case::invalid(InferenceError::InvalidRequest("unknown model".into()), ErrorKind::InvalidRequest)]
#[tokio::test]
async fn test_fatal_failure_aborts_remaining_samples(
    #[case] error: InferenceError,
    #[case] expected: ErrorKind,
) {
    let mock = Arc::new(MockInferenceClient::failing(error));
    let runner = ExperimentRunner::new(mock.clone()).with_sample_concurrency(1);
    let task = TaskDefinition::new("t", numbered_samples(5));

    let result = runner.run(&task, &fast_config("m", 3)).await.unwrap();

    match &result.status {
        RunStatus::Aborted { kind, .. } => assert_eq!(*kind, expected),
        other => panic!("expected an aborted run, got {:?}", other),
    }
    assert_eq!(result.sample_results.len(), 1);
    assert_eq!(result.expected_samples, 5);
    assert!(!result.is_complete());
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_thinking_on_unsupported_model_aborts_without_calls() {
    let mock = Arc::new(MockInferenceClient::always("ok"));
    let runner = ExperimentRunner::new(mock.clone());
    let task = TaskDefinition::new("t", numbered_samples(3));
    let config = ExperimentConfig::builder("claude-3-5-sonnet-20241022")
        .thinking(true)
        .build()
        .unwrap();

    let result = runner.run(&task, &config).await.unwrap();

    assert!(matches!(
        result.status,
        RunStatus::Aborted {
            kind: ErrorKind::InvalidRequest,
            ..
        }
    ));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_cancellation_keeps_completed_samples() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let mock = Arc::new(MockInferenceClient::new(move |req| {
        if prompt_has_id(&req.prompt, 1) {
            trigger.cancel();
        }
        Ok(InferenceResponse::text("ok"))
    }));
    let runner = ExperimentRunner::new(mock.clone()).with_sample_concurrency(1);
    let task = TaskDefinition::new("t", numbered_samples(5));

    let result = runner
        .run_with_cancel(&task, &fast_config("m", 0), cancel)
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Cancelled);
    let indices: Vec<usize> = result.sample_results.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_empty_task_completes_without_calls() {
    let mock = Arc::new(MockInferenceClient::always("ok"));
    let runner = ExperimentRunner::new(mock.clone());
    let task = TaskDefinition::new("empty", Vec::new());

    let result = runner.run(&task, &fast_config("m", 0)).await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.is_complete());
    assert_eq!(result.metrics.total_samples, 0);
    assert_eq!(result.metrics.success_rate, 1.0);
    assert_eq!(result.metrics.average_score, None);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_cancellation_stops_pending_retries() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let mock = Arc::new(MockInferenceClient::new(move |_| {
        trigger.cancel();
        Err(InferenceError::Transient("connection reset".into()))
    }));
    let runner = ExperimentRunner::new(mock.clone());
    let task = TaskDefinition::new("t", numbered_samples(1));

    let result = runner
        .run_with_cancel(&task, &fast_config("m", 3), cancel)
        .await
        .unwrap();

    assert_eq!(mock.call_count(), 1);
    assert_eq!(result.status, RunStatus::Cancelled);
    assert!(result.sample_results.is_empty());
}

// ===== Identity, Validation and Events =====

#[tokio::test]
async fn test_result_identity_matches_config() {
    let runner = ExperimentRunner::new(Arc::new(MockInferenceClient::always("ok")));
    let task = TaskDefinition::new("identity_task", numbered_samples(1));
    let config = fast_config("m", 0);

    let first = runner.run(&task, &config).await.unwrap();
    let second = runner.run(&task, &config).await.unwrap();

    assert_eq!(first.experiment_id, config.experiment_id("identity_task").unwrap());
    assert_eq!(first.experiment_id, second.experiment_id);
    assert_eq!(first.config_digest, second.config_digest);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_any_call() {
    let mock = Arc::new(MockInferenceClient::always("ok"));
    let runner = ExperimentRunner::new(mock.clone());
    let task = TaskDefinition::new("t", numbered_samples(1));
    let config = ExperimentConfig {
        temperature: 5.0,
        ..ExperimentConfig::new("m")
    };

    assert!(runner.run(&task, &config).await.is_err());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_progress_events() {
    let mut runner = ExperimentRunner::new(Arc::new(MockInferenceClient::always("ok")));
    let mut events = runner.enable_progress_tracking();
    let task = TaskDefinition::new("t", numbered_samples(3));

    runner.run(&task, &fast_config("m", 0)).await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(received.len(), 5);
    assert!(matches!(received[0], RunEvent::ExperimentStarted { samples: 3, .. }));
    assert!(received[1..4]
        .iter()
        .all(|e| matches!(e, RunEvent::SampleCompleted { succeeded: true, .. })));
    assert!(matches!(
        received[4],
        RunEvent::ExperimentFinished {
            status: RunStatus::Completed,
            ..
        }
    ));
}
