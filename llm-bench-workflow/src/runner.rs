use chrono::Utc;
use futures::stream::{self, StreamExt};
use llm_bench_client::{InferenceClient, InferenceRequest, RetryingClient};
use llm_bench_core::{
    ErrorKind, ExperimentConfig, ExperimentId, ExperimentResult, GroundTruth, PromptFormatter,
    Result, RunStatus, Sample, SampleError, SampleResult, Scorer, TaskDefinition,
};
use llm_bench_metrics::{parse_prediction, DefaultScorer, MetricAggregator};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::RunEvent;
use crate::formatting::{resolve_system_instructions, DefaultPromptFormatter};

pub const DEFAULT_SAMPLE_CONCURRENCY: usize = 4;

/// Everything shared by the samples of one experiment.
struct RunContext<'a> {
    experiment_id: &'a ExperimentId,
    task: &'a TaskDefinition,
    config: &'a ExperimentConfig,
    template: &'a str,
    system_instructions: Option<String>,
    formatter: &'a dyn PromptFormatter,
    scorer: &'a dyn Scorer,
    client: RetryingClient,
    halt: CancellationToken,
    fatal: Mutex<Option<SampleError>>,
}

/// Runs one configuration against one task.
///
/// Samples are dispatched through a bounded, order-preserving pool so the
/// results always come back in input order. The runner never persists.
#[derive(Clone)]
pub struct ExperimentRunner {
    client: Arc<dyn InferenceClient>,
    sample_concurrency: usize,
    default_system_instructions: Option<String>,
    progress_tx: Option<broadcast::Sender<RunEvent>>,
}

impl ExperimentRunner {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self {
            client,
            sample_concurrency: DEFAULT_SAMPLE_CONCURRENCY,
            default_system_instructions: None,
            progress_tx: None,
        }
    }

    pub fn with_sample_concurrency(mut self, concurrency: usize) -> Self {
        self.sample_concurrency = concurrency.max(1);
        self
    }

    /// Instructions used when neither the config nor the task has any.
    pub fn with_default_system_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.default_system_instructions = Some(instructions.into());
        self
    }

    /// Enable progress tracking
    pub fn enable_progress_tracking(&mut self) -> broadcast::Receiver<RunEvent> {
        match &self.progress_tx {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1024);
                self.progress_tx = Some(tx);
                rx
            }
        }
    }

    pub fn sample_concurrency(&self) -> usize {
        self.sample_concurrency
    }

    pub(crate) fn report_progress(&self, event: RunEvent) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(event);
        }
    }

    pub async fn run(&self, task: &TaskDefinition, config: &ExperimentConfig) -> Result<ExperimentResult> {
        self.run_with_cancel(task, config, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but stops dispatching samples once `cancel`
    /// fires. In-flight calls complete and their results are kept; a sample
    /// waiting to retry gives up and is left out, like an undispatched one.
    ///
    /// Errors only when the configuration itself is invalid; every
    /// per-sample failure is captured in the returned result.
    pub async fn run_with_cancel(
        &self,
        task: &TaskDefinition,
        config: &ExperimentConfig,
        cancel: CancellationToken,
    ) -> Result<ExperimentResult> {
        config.validate_config()?;
        let config_digest = config.digest(task.name())?;
        let experiment_id = ExperimentId::from_digest(&config_digest);

        let default_formatter = DefaultPromptFormatter;
        let default_scorer = DefaultScorer;
        let context = RunContext {
            experiment_id: &experiment_id,
            task,
            config,
            template: config
                .prompt_template
                .as_deref()
                .unwrap_or_else(|| task.prompt_template()),
            system_instructions: resolve_system_instructions(
                task,
                config,
                self.default_system_instructions.as_deref(),
            ),
            formatter: task
                .formatter()
                .map_or(&default_formatter as &dyn PromptFormatter, |f| f.as_ref()),
            scorer: task
                .scorer()
                .map_or(&default_scorer as &dyn Scorer, |s| s.as_ref()),
            client: RetryingClient::for_config(self.client.clone(), config),
            halt: cancel.child_token(),
            fatal: Mutex::new(None),
        };

        info!(
            experiment_id = %experiment_id,
            task = task.name(),
            model = %config.model_id,
            samples = task.len(),
            scorer = context.scorer.name(),
            "Starting experiment"
        );
        self.report_progress(RunEvent::ExperimentStarted {
            experiment_id: experiment_id.clone(),
            task: task.name().to_string(),
            model_id: config.model_id.clone(),
            samples: task.len(),
        });

        let started = Instant::now();
        let context = &context;
        let sample_results: Vec<SampleResult> = stream::iter(task.samples().iter().enumerate())
            .map(|(index, sample)| self.run_sample(context, index, sample))
            .buffered(self.sample_concurrency)
            .filter_map(|result| async move { result })
            .collect()
            .await;

        let status = match context.fatal.lock().ok().and_then(|mut slot| slot.take()) {
            Some(SampleError { kind, message }) => RunStatus::Aborted { kind, message },
            None if cancel.is_cancelled() && sample_results.len() < task.len() => RunStatus::Cancelled,
            None => RunStatus::Completed,
        };
        let metrics = MetricAggregator::summarize(&sample_results);

        match &status {
            RunStatus::Completed => info!(
                experiment_id = %experiment_id,
                success_rate = metrics.success_rate,
                average_score = ?metrics.average_score,
                "Experiment completed"
            ),
            RunStatus::Cancelled => warn!(
                experiment_id = %experiment_id,
                completed = sample_results.len(),
                expected = task.len(),
                "Experiment cancelled"
            ),
            RunStatus::Aborted { kind, message } => error!(
                experiment_id = %experiment_id,
                kind = %kind,
                completed = sample_results.len(),
                expected = task.len(),
                "Experiment aborted: {}",
                message
            ),
        }

        let result = ExperimentResult {
            experiment_id,
            task_name: task.name().to_string(),
            config: config.clone(),
            config_digest,
            timestamp: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
            status,
            expected_samples: task.len(),
            sample_results,
            metrics,
        };

        self.report_progress(RunEvent::ExperimentFinished {
            experiment_id: result.experiment_id.clone(),
            task: result.task_name.clone(),
            status: result.status.clone(),
            metrics: result.metrics.clone(),
        });

        Ok(result)
    }

    /// `None` when the sample was never dispatched or its retries were
    /// abandoned on cancellation.
    async fn run_sample(
        &self,
        context: &RunContext<'_>,
        index: usize,
        sample: &Sample,
    ) -> Option<SampleResult> {
        if context.halt.is_cancelled() {
            return None;
        }

        let ground_truth = context.task.ground_truth_for(index).cloned();
        let prompt = context.formatter.format(
            context.template,
            sample,
            ground_truth.as_ref(),
            context.task.schema(),
        );
        let request = InferenceRequest::from_config(
            context.config,
            context.system_instructions.clone(),
            prompt,
        );

        let started = Instant::now();
        let outcome = context.client.invoke_with_cancel(&request, &context.halt).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(completion) => {
                let response = completion.response;
                let (score, error) =
                    score_sample(context.scorer, &response.text, ground_truth.as_ref(), sample);
                if let Some(error) = &error {
                    warn!(
                        experiment_id = %context.experiment_id,
                        sample = index,
                        scorer = context.scorer.name(),
                        "Scoring failed: {}",
                        error.message
                    );
                }
                debug!(
                    experiment_id = %context.experiment_id,
                    sample = index,
                    attempts = completion.attempts,
                    score = ?score,
                    "Sample completed"
                );
                SampleResult {
                    index,
                    input: sample.clone(),
                    prediction: Some(parse_prediction(&response.text)),
                    response: Some(response.text),
                    reasoning: response.reasoning,
                    ground_truth,
                    score,
                    error,
                    attempts: completion.attempts,
                    usage: response.usage,
                    latency_ms,
                }
            }
            Err(failure) if failure.cancelled => {
                debug!(
                    experiment_id = %context.experiment_id,
                    sample = index,
                    attempts = failure.attempts,
                    "Sample abandoned: {}",
                    failure.error
                );
                return None;
            }
            Err(failure) => {
                let kind = failure.error.kind();
                let sample_error = SampleError::new(kind, failure.error.to_string());
                if kind.is_fatal_for_run() {
                    if let Ok(mut slot) = context.fatal.lock() {
                        slot.get_or_insert_with(|| sample_error.clone());
                    }
                    context.halt.cancel();
                } else {
                    warn!(
                        experiment_id = %context.experiment_id,
                        sample = index,
                        attempts = failure.attempts,
                        kind = %kind,
                        "Sample failed: {}",
                        failure.error
                    );
                }
                SampleResult::failed(
                    index,
                    sample.clone(),
                    ground_truth,
                    sample_error,
                    failure.attempts,
                    latency_ms,
                )
            }
        };

        self.report_progress(RunEvent::SampleCompleted {
            experiment_id: context.experiment_id.clone(),
            index,
            succeeded: result.succeeded(),
            score: result.score,
        });
        Some(result)
    }
}

/// Score one response. Absent ground truth is unscored; a scorer error,
/// panic or out-of-range value degrades to a null score with a
/// `ScoringFailure`.
fn score_sample(
    scorer: &dyn Scorer,
    response: &str,
    ground_truth: Option<&GroundTruth>,
    sample: &Sample,
) -> (Option<f64>, Option<SampleError>) {
    let Some(ground_truth) = ground_truth else {
        return (None, None);
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        scorer.score(response, ground_truth, sample)
    }));

    let failure = |message: String| -> (Option<f64>, Option<SampleError>) {
        (None, Some(SampleError::new(ErrorKind::ScoringFailure, message)))
    };
    match outcome {
        Ok(Ok(Some(score))) if (0.0..=1.0).contains(&score) => (Some(score), None),
        Ok(Ok(Some(score))) => failure(format!(
            "scorer {} returned {} outside [0, 1]",
            scorer.name(),
            score
        )),
        Ok(Ok(None)) => (None, None),
        Ok(Err(e)) => failure(format!("scorer {} failed: {}", scorer.name(), e)),
        Err(payload) => failure(format!(
            "scorer {} panicked: {}",
            scorer.name(),
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
