//! Running configurations over several tasks, shared by `run` and `rerun`.
//!
//! A task that cannot be loaded or run is reported and skipped; the rest of
//! the batch keeps going.

use llm_bench_core::{ExperimentConfig, ExperimentId, ExperimentRepository, ExperimentResult, TaskDefinition};
use llm_bench_workflow::{CancellationToken, ExperimentRunner};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::tasks::TaskLoader;

/// A task that produced no experiment result.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskFailure {
    pub task: String,
    pub error: String,
}

/// Totals across every task of a batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub tasks_completed: usize,
    /// Ran, but were cancelled or aborted before every sample finished.
    pub tasks_incomplete: usize,
    pub tasks_failed: usize,
    pub total_samples: usize,
    /// Mean of the per-task average scores; `None` when no task was scored.
    pub average_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub experiments: Vec<ExperimentResult>,
    pub failures: Vec<TaskFailure>,
    /// Results that ran but could not be written.
    pub unsaved: Vec<ExperimentId>,
}

impl BatchReport {
    pub fn summary(&self) -> RunSummary {
        let tasks_completed = self.experiments.iter().filter(|e| e.is_complete()).count();
        let scores: Vec<f64> = self
            .experiments
            .iter()
            .filter_map(|e| e.metrics.average_score)
            .collect();

        RunSummary {
            tasks_completed,
            tasks_incomplete: self.experiments.len() - tasks_completed,
            tasks_failed: self.failures.len(),
            total_samples: self.experiments.iter().map(|e| e.metrics.total_samples).sum(),
            average_accuracy: (!scores.is_empty())
                .then(|| scores.iter().sum::<f64>() / scores.len() as f64),
        }
    }
}

/// Load each named task, keeping the ones that load and reporting the rest.
pub fn load_tasks(loader: &TaskLoader, names: &[String]) -> (Vec<TaskDefinition>, Vec<TaskFailure>) {
    let mut tasks = Vec::with_capacity(names.len());
    let mut failures = Vec::new();
    for name in names {
        match loader.load(name) {
            Ok(task) => tasks.push(task),
            Err(e) => {
                warn!(task = %name, "Skipping task: {:#}", e);
                failures.push(TaskFailure {
                    task: name.clone(),
                    error: format!("{:#}", e),
                });
            }
        }
    }
    (tasks, failures)
}

/// Pairs of task name and configuration to run again.
///
/// With `every_task`, each distinct configuration is run against every
/// listed task, so tasks added since the original run are picked up.
/// Otherwise each experiment is run against its own task. Duplicates are
/// dropped, keeping first-seen order.
pub fn plan_reruns(
    experiments: Vec<(String, ExperimentConfig)>,
    every_task: Option<&[String]>,
) -> Vec<(String, ExperimentConfig)> {
    let mut plan: Vec<(String, ExperimentConfig)> = Vec::new();
    match every_task {
        Some(tasks) => {
            let mut configs: Vec<ExperimentConfig> = Vec::new();
            for (_, config) in experiments {
                if !configs.contains(&config) {
                    configs.push(config);
                }
            }
            for config in &configs {
                for task in tasks {
                    plan.push((task.clone(), config.clone()));
                }
            }
        }
        None => {
            for job in experiments {
                if !plan.contains(&job) {
                    plan.push(job);
                }
            }
        }
    }
    plan
}

/// Run each job in order, saving every result when a repository is given.
///
/// Stops starting new jobs once `cancel` fires.
pub async fn run_jobs(
    runner: &ExperimentRunner,
    jobs: &[(&TaskDefinition, ExperimentConfig)],
    repository: Option<&dyn ExperimentRepository>,
    cancel: &CancellationToken,
) -> BatchReport {
    let mut report = BatchReport::default();
    for (task, config) in jobs {
        if cancel.is_cancelled() {
            break;
        }
        let result = match runner.run_with_cancel(task, config, cancel.clone()).await {
            Ok(result) => result,
            Err(e) => {
                error!(task = task.name(), model = %config.model_id, "Experiment failed: {}", e);
                report.failures.push(TaskFailure {
                    task: task.name().to_string(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        if let Some(repository) = repository {
            match repository.save(&result).await {
                Ok(()) => info!(experiment_id = %result.experiment_id, "Experiment saved"),
                Err(e) => {
                    error!(experiment_id = %result.experiment_id, error = %e, "Failed to save experiment");
                    report.unsaved.push(result.experiment_id.clone());
                }
            }
        }
        report.experiments.push(result);
    }
    report
}
