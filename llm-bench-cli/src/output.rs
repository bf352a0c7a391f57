//! Terminal output: tables, JSON and live progress.

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use llm_bench_core::{ExperimentId, ExperimentMetrics, ExperimentResult, RunStatus, SuiteResult};
use llm_bench_storage::LogEntry;
use llm_bench_workflow::RunEvent;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::batch::{BatchReport, RunSummary};

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable tables
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// One row of `list-tasks`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub name: String,
    pub samples: usize,
    pub ground_truth: bool,
    pub schema: bool,
    pub scorer: Option<String>,
}

pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_table(&self) -> bool {
        self.format == OutputFormat::Table
    }

    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub fn tasks(&self, tasks: &[TaskSummary]) -> Result<()> {
        if !self.is_table() {
            return self.json(tasks);
        }
        if tasks.is_empty() {
            println!("{}", "No tasks found.".dimmed());
            return Ok(());
        }

        let mut table = new_table(&["Task", "Samples", "Ground truth", "Schema", "Scorer"]);
        for task in tasks {
            table.add_row(vec![
                Cell::new(&task.name),
                Cell::new(task.samples),
                Cell::new(yes_no(task.ground_truth)),
                Cell::new(yes_no(task.schema)),
                Cell::new(task.scorer.as_deref().unwrap_or("default")),
            ]);
        }
        println!("{table}");
        println!("\n{} {} task(s)", "Total:".bold(), tasks.len().to_string().green());
        Ok(())
    }

    pub fn log_entries(&self, entries: &[LogEntry]) -> Result<()> {
        if !self.is_table() {
            return self.json(entries);
        }
        if entries.is_empty() {
            println!("{}", "No experiments logged.".dimmed());
            return Ok(());
        }

        let mut table = new_table(&[
            "ID", "Task", "Model", "Status", "Samples", "Success", "Avg score", "Timestamp",
        ]);
        for entry in entries {
            table.add_row(vec![
                Cell::new(entry.experiment_id.as_str()),
                Cell::new(&entry.task_name),
                Cell::new(&entry.model_id),
                status_cell(&entry.status),
                Cell::new(format!(
                    "{}/{}",
                    entry.metrics.total_samples, entry.expected_samples
                )),
                Cell::new(format_rate(entry.metrics.success_rate)),
                Cell::new(format_score(entry.metrics.average_score)),
                Cell::new(entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            ]);
        }
        println!("{table}");
        println!(
            "\n{} {} experiment(s)",
            "Total:".bold(),
            entries.len().to_string().green()
        );
        Ok(())
    }

    pub fn experiment(&self, result: &ExperimentResult) -> Result<()> {
        if !self.is_table() {
            return self.json(result);
        }

        println!(
            "{} {} ({} on {})",
            "Experiment".bold(),
            result.experiment_id.as_str().cyan(),
            result.config.model_id,
            result.task_name
        );
        println!("{table}", table = metrics_table(&result.status, &result.metrics, result.expected_samples));

        let failed: Vec<_> = result.sample_results.iter().filter(|s| s.error.is_some()).collect();
        if !failed.is_empty() {
            let mut table = new_table(&["Sample", "Error", "Attempts", "Message"]);
            for sample in failed {
                if let Some(error) = &sample.error {
                    table.add_row(vec![
                        Cell::new(sample.index),
                        Cell::new(error.kind.as_str()).fg(Color::Red),
                        Cell::new(sample.attempts),
                        Cell::new(truncate(&error.message, 80)),
                    ]);
                }
            }
            println!("{table}");
        }
        Ok(())
    }

    /// Each experiment of a multi-task run, then the cross-task totals.
    pub fn batch(&self, report: &BatchReport) -> Result<()> {
        let summary = report.summary();
        if !self.is_table() {
            #[derive(Serialize)]
            struct Document<'a> {
                #[serde(flatten)]
                report: &'a BatchReport,
                summary: &'a RunSummary,
            }
            return self.json(&Document {
                report,
                summary: &summary,
            });
        }

        for result in &report.experiments {
            self.experiment(result)?;
        }
        for failure in &report.failures {
            self.error(&format!("{}: {}", failure.task, failure.error));
        }
        for id in &report.unsaved {
            self.error(&format!("Failed to save {}", id));
        }
        if report.experiments.len() + report.failures.len() > 1 {
            println!("{table}", table = summary_table(&summary));
        }
        Ok(())
    }

    pub fn suite(&self, suite: &SuiteResult) -> Result<()> {
        if !self.is_table() {
            return self.json(suite);
        }

        let mut table = new_table(&[
            "ID", "Model", "Temp", "Thinking", "Status", "Success", "Avg score",
        ]);
        for experiment in &suite.experiments {
            table.add_row(vec![
                Cell::new(experiment.experiment_id.as_str()),
                Cell::new(&experiment.config.model_id),
                Cell::new(experiment.config.temperature),
                Cell::new(yes_no(experiment.config.thinking)),
                status_cell(&experiment.status),
                Cell::new(format_rate(experiment.metrics.success_rate)),
                Cell::new(format_score(experiment.metrics.average_score)),
            ]);
        }
        println!("{table}");

        for failure in &suite.failures {
            self.error(&format!("{}: {}", failure.config.model_id, failure.error));
        }
        println!(
            "\n{} {}/{} experiment(s) ran",
            "Total:".bold(),
            suite.experiments.len().to_string().green(),
            suite.planned
        );
        if suite.cancelled {
            self.warning("Suite was cancelled before every combination ran");
        }
        Ok(())
    }

    pub fn success(&self, message: &str) {
        if self.is_table() {
            eprintln!("{} {}", "✓".green(), message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.is_table() {
            eprintln!("{} {}", "⚠".yellow(), message);
        } else {
            eprintln!("Warning: {}", message);
        }
    }

    pub fn error(&self, message: &str) {
        if self.is_table() {
            eprintln!("{} {}", "✗".red(), message);
        } else {
            eprintln!("Error: {}", message);
        }
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

fn metrics_table(status: &RunStatus, metrics: &ExperimentMetrics, expected: usize) -> Table {
    let mut table = new_table(&["Metric", "Value"]);
    table.add_row(vec![Cell::new("Status"), status_cell(status)]);
    table.add_row(vec![
        Cell::new("Samples"),
        Cell::new(format!("{}/{}", metrics.total_samples, expected)),
    ]);
    table.add_row(vec![
        Cell::new("Successful runs"),
        Cell::new(metrics.successful_runs),
    ]);
    table.add_row(vec![Cell::new("Failed runs"), Cell::new(metrics.failed_runs)]);
    table.add_row(vec![
        Cell::new("Success rate"),
        Cell::new(format_rate(metrics.success_rate)),
    ]);
    table.add_row(vec![Cell::new("Scored"), Cell::new(metrics.num_scored)]);
    for (label, value) in [
        ("Average score", metrics.average_score),
        ("Median score", metrics.median_score),
        ("Min score", metrics.min_score),
        ("Max score", metrics.max_score),
        ("Std dev", metrics.std_dev),
    ] {
        table.add_row(vec![Cell::new(label), Cell::new(format_score(value))]);
    }
    table
}

fn summary_table(summary: &RunSummary) -> Table {
    let mut table = new_table(&["Overall", "Value"]);
    table.add_row(vec![
        Cell::new("Tasks completed"),
        Cell::new(summary.tasks_completed).fg(Color::Green),
    ]);
    if summary.tasks_incomplete > 0 {
        table.add_row(vec![
            Cell::new("Tasks incomplete"),
            Cell::new(summary.tasks_incomplete).fg(Color::Yellow),
        ]);
    }
    table.add_row(vec![
        Cell::new("Tasks failed"),
        Cell::new(summary.tasks_failed).fg(if summary.tasks_failed > 0 {
            Color::Red
        } else {
            Color::Reset
        }),
    ]);
    table.add_row(vec![Cell::new("Total samples"), Cell::new(summary.total_samples)]);
    table.add_row(vec![
        Cell::new("Average accuracy"),
        Cell::new(format_score(summary.average_accuracy)),
    ]);
    table
}

fn status_cell(status: &RunStatus) -> Cell {
    let color = match status {
        RunStatus::Completed => Color::Green,
        RunStatus::Cancelled => Color::Yellow,
        RunStatus::Aborted { .. } => Color::Red,
    };
    Cell::new(format_status(status)).fg(color)
}

pub fn format_status(status: &RunStatus) -> String {
    match status {
        RunStatus::Completed => "completed".to_string(),
        RunStatus::Cancelled => "cancelled".to_string(),
        RunStatus::Aborted { kind, .. } => format!("aborted ({})", kind),
    }
}

pub fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "n/a".to_string(), |s| format!("{:.3}", s))
}

pub fn format_rate(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

// ===== Progress =====

/// Render runner events as progress bars until the channel closes.
///
/// The channel closes once every runner holding the sender is dropped, so
/// callers must drop the runner before awaiting the returned handle.
pub fn spawn_progress(mut events: broadcast::Receiver<RunEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let multi = MultiProgress::new();
        let mut suite_bar: Option<ProgressBar> = None;
        let mut bars: HashMap<ExperimentId, ProgressBar> = HashMap::new();

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress renderer fell behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                RunEvent::SuitePlanned { task, planned } => {
                    let bar = multi.add(ProgressBar::new(planned as u64));
                    bar.set_style(bar_style());
                    bar.set_message(format!("suite {}", task));
                    suite_bar = Some(bar);
                }
                RunEvent::ExperimentStarted {
                    experiment_id,
                    task,
                    model_id,
                    samples,
                } => {
                    let bar = multi.add(ProgressBar::new(samples as u64));
                    bar.set_style(bar_style());
                    bar.set_message(format!("{} {} {}", experiment_id, task, model_id));
                    bars.insert(experiment_id, bar);
                }
                RunEvent::SampleCompleted { experiment_id, .. } => {
                    if let Some(bar) = bars.get(&experiment_id) {
                        bar.inc(1);
                    }
                }
                RunEvent::ExperimentFinished {
                    experiment_id,
                    status,
                    metrics,
                    ..
                } => {
                    if let Some(bar) = bars.remove(&experiment_id) {
                        bar.finish_with_message(format!(
                            "{} {} avg {}",
                            experiment_id,
                            format_status(&status),
                            format_score(metrics.average_score)
                        ));
                    }
                    if let Some(bar) = &suite_bar {
                        bar.inc(1);
                    }
                }
                RunEvent::ExperimentFailed {
                    task,
                    model_id,
                    error,
                } => {
                    let _ = multi.println(format!("{} {} {}: {}", "✗".red(), task, model_id, error));
                    if let Some(bar) = &suite_bar {
                        bar.inc(1);
                    }
                }
            }
        }

        for (_, bar) in bars.drain() {
            bar.abandon();
        }
        if let Some(bar) = suite_bar {
            bar.finish();
        }
    })
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
}
