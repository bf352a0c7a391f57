use futures::future;
use futures::stream::{self, StreamExt};
use llm_bench_core::{
    ExperimentConfig, ExperimentRepository, ExperimentResult, SuiteFailure, SuiteResult,
    TaskDefinition,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::events::RunEvent;
use crate::runner::ExperimentRunner;

pub const DEFAULT_EXPERIMENT_CONCURRENCY: usize = 1;

// ===== Axes =====

/// Values to vary across a suite. An empty axis keeps the base
/// configuration's value and contributes a factor of one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteAxes {
    pub models: Vec<String>,
    pub system_instructions: Vec<Option<String>>,
    pub prompt_templates: Vec<Option<String>>,
    pub temperatures: Vec<f64>,
    pub thinking: Vec<bool>,
}

impl SuiteAxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn system_instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.system_instructions = instructions.into_iter().map(|s| Some(s.into())).collect();
        self
    }

    pub fn prompt_templates<I, S>(mut self, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prompt_templates = templates.into_iter().map(|s| Some(s.into())).collect();
        self
    }

    pub fn temperatures(mut self, temperatures: impl IntoIterator<Item = f64>) -> Self {
        self.temperatures = temperatures.into_iter().collect();
        self
    }

    pub fn thinking(mut self, modes: impl IntoIterator<Item = bool>) -> Self {
        self.thinking = modes.into_iter().collect();
        self
    }

    /// Number of combinations [`expand`](Self::expand) yields.
    pub fn planned_count(&self) -> usize {
        [
            self.models.len(),
            self.system_instructions.len(),
            self.prompt_templates.len(),
            self.temperatures.len(),
            self.thinking.len(),
        ]
        .iter()
        .map(|n| (*n).max(1))
        .product()
    }

    /// Cartesian product over every axis, models outermost.
    pub fn expand(&self, base: &ExperimentConfig) -> Vec<ExperimentConfig> {
        fn axis<T: Clone>(values: &[T], fallback: T) -> Vec<T> {
            if values.is_empty() {
                vec![fallback]
            } else {
                values.to_vec()
            }
        }

        let models = axis(&self.models, base.model_id.clone());
        let instructions = axis(&self.system_instructions, base.system_instructions.clone());
        let templates = axis(&self.prompt_templates, base.prompt_template.clone());
        let temperatures = axis(&self.temperatures, base.temperature);
        let thinking = axis(&self.thinking, base.thinking);

        let mut configs = Vec::with_capacity(self.planned_count());
        for model in &models {
            for system in &instructions {
                for template in &templates {
                    for temperature in &temperatures {
                        for thinking in &thinking {
                            configs.push(ExperimentConfig {
                                model_id: model.clone(),
                                system_instructions: system.clone(),
                                prompt_template: template.clone(),
                                temperature: *temperature,
                                thinking: *thinking,
                                ..base.clone()
                            });
                        }
                    }
                }
            }
        }
        configs
    }
}

// ===== Suite Runner =====

/// Runs every combination of a [`SuiteAxes`] against one task, optionally
/// saving each result as soon as it finishes.
#[derive(Clone)]
pub struct SuiteRunner {
    runner: ExperimentRunner,
    experiment_concurrency: usize,
    repository: Option<Arc<dyn ExperimentRepository>>,
}

impl SuiteRunner {
    pub fn new(runner: ExperimentRunner) -> Self {
        Self {
            runner,
            experiment_concurrency: DEFAULT_EXPERIMENT_CONCURRENCY,
            repository: None,
        }
    }

    pub fn with_experiment_concurrency(mut self, concurrency: usize) -> Self {
        self.experiment_concurrency = concurrency.max(1);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn ExperimentRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Enable progress tracking
    pub fn enable_progress_tracking(&mut self) -> broadcast::Receiver<RunEvent> {
        self.runner.enable_progress_tracking()
    }

    pub async fn run_suite(
        &self,
        task: &TaskDefinition,
        axes: &SuiteAxes,
        base: &ExperimentConfig,
    ) -> SuiteResult {
        self.run_suite_with_cancel(task, axes, base, CancellationToken::new())
            .await
    }

    /// Combinations not yet started when `cancel` fires are skipped;
    /// running experiments stop dispatching samples and keep what they have.
    pub async fn run_suite_with_cancel(
        &self,
        task: &TaskDefinition,
        axes: &SuiteAxes,
        base: &ExperimentConfig,
        cancel: CancellationToken,
    ) -> SuiteResult {
        let configs = axes.expand(base);
        let planned = configs.len();

        info!(task = task.name(), planned, "Suite planned");
        self.runner.report_progress(RunEvent::SuitePlanned {
            task: task.name().to_string(),
            planned,
        });

        let outcomes: Vec<(ExperimentConfig, Outcome)> =
            stream::iter(configs)
                .map(|config| {
                    let cancel = cancel.clone();
                    async move {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let outcome = self.run_one(task, &config, cancel).await;
                        Some((config, outcome))
                    }
                })
                .buffered(self.experiment_concurrency)
                .filter_map(future::ready)
                .collect()
                .await;

        let mut suite = SuiteResult {
            planned,
            cancelled: cancel.is_cancelled(),
            ..Default::default()
        };
        for (config, outcome) in outcomes {
            match outcome {
                Outcome::Saved(result) => suite.experiments.push(result),
                Outcome::Unsaved(result, error) => {
                    suite.failures.push(SuiteFailure {
                        config,
                        experiment_id: Some(result.experiment_id.clone()),
                        error,
                    });
                    suite.experiments.push(result);
                }
                Outcome::Rejected(error) => suite.failures.push(SuiteFailure {
                    config,
                    experiment_id: None,
                    error,
                }),
            }
        }

        info!(
            task = task.name(),
            planned,
            completed = suite.experiments.len(),
            failed = suite.failures.len(),
            cancelled = suite.cancelled,
            "Suite finished"
        );
        suite
    }

    async fn run_one(
        &self,
        task: &TaskDefinition,
        config: &ExperimentConfig,
        cancel: CancellationToken,
    ) -> Outcome {
        let result = match self.runner.run_with_cancel(task, config, cancel).await {
            Ok(result) => result,
            Err(e) => {
                let message = e.to_string();
                self.report_failure(task, config, &message);
                return Outcome::Rejected(message);
            }
        };

        let Some(repository) = &self.repository else {
            return Outcome::Saved(result);
        };
        match repository.save(&result).await {
            Ok(_) => Outcome::Saved(result),
            Err(e) => {
                let message = format!("failed to save experiment {}: {}", result.experiment_id, e);
                self.report_failure(task, config, &message);
                Outcome::Unsaved(result, message)
            }
        }
    }

    fn report_failure(&self, task: &TaskDefinition, config: &ExperimentConfig, message: &str) {
        error!(task = task.name(), model = %config.model_id, "Experiment failed: {}", message);
        self.runner.report_progress(RunEvent::ExperimentFailed {
            task: task.name().to_string(),
            model_id: config.model_id.clone(),
            error: message.to_string(),
        });
    }
}

/// How one combination ended.
enum Outcome {
    Saved(ExperimentResult),
    /// Ran, but the repository rejected the result.
    Unsaved(ExperimentResult, String),
    /// The configuration never ran.
    Rejected(String),
}
