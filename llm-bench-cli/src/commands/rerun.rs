use anyhow::Result;
use clap::Args;
use llm_bench_core::{ExperimentRepository, TaskDefinition};
use tracing::{info, warn};

use crate::batch::{load_tasks, plan_reruns, run_jobs, TaskFailure};
use crate::context::{cancel_on_ctrl_c, Context};
use crate::output::spawn_progress;

#[derive(Debug, Args)]
pub struct RerunArgs {
    /// Only experiments for this task
    #[arg(short, long)]
    pub task: Option<String>,

    /// Only experiments for this model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Run each saved configuration against every task, including tasks
    /// added since it last ran
    #[arg(long)]
    pub every_task: bool,
}

/// Re-run saved experiments with their stored configuration so changed or
/// new task data is reflected in the results.
pub async fn execute(ctx: &Context, args: RerunArgs) -> Result<()> {
    let store = ctx.store().await?;
    let mut entries = store.latest().await?;
    entries.retain(|entry| {
        args.task.as_deref().map_or(true, |t| entry.task_name == t)
            && args.model.as_deref().map_or(true, |m| entry.model_id == m)
    });
    if entries.is_empty() {
        ctx.output.warning("No logged experiments match; nothing to rerun");
        return Ok(());
    }

    let mut failures = Vec::new();
    let mut saved = Vec::with_capacity(entries.len());
    for entry in &entries {
        match store.find_by_id(&entry.experiment_id).await? {
            Some(record) => saved.push((record.task_name, record.config)),
            None => {
                warn!(experiment_id = %entry.experiment_id, "Logged experiment has no record, skipping");
                failures.push(TaskFailure {
                    task: entry.task_name.clone(),
                    error: format!("no record for experiment {}", entry.experiment_id),
                });
            }
        }
    }

    let loader = ctx.task_loader();
    let every_task = if args.every_task {
        Some(loader.list()?)
    } else {
        None
    };
    let plan = plan_reruns(saved, every_task.as_deref());

    let mut names: Vec<String> = plan.iter().map(|(task, _)| task.clone()).collect();
    names.sort();
    names.dedup();
    let (tasks, load_failures) = load_tasks(&loader, &names);
    failures.extend(load_failures);

    let jobs: Vec<(&TaskDefinition, _)> = plan
        .into_iter()
        .filter_map(|(name, config)| {
            tasks
                .iter()
                .find(|task| task.name() == name)
                .map(|task| (task, config))
        })
        .collect();
    info!(experiments = jobs.len(), skipped = failures.len(), "Rerun planned");

    let mut runner = ctx.runner()?;
    let progress = ctx
        .output
        .is_table()
        .then(|| spawn_progress(runner.enable_progress_tracking()));
    let cancel = cancel_on_ctrl_c();

    let repository: &dyn ExperimentRepository = &*store;
    let mut report = run_jobs(&runner, &jobs, Some(repository), &cancel).await;
    failures.append(&mut report.failures);
    report.failures = failures;

    drop(runner);
    if let Some(handle) = progress {
        let _ = handle.await;
    }

    ctx.output.batch(&report)?;
    if cancel.is_cancelled() {
        ctx.output.warning("Rerun interrupted; partial results were kept");
    } else {
        ctx.output.success(&format!(
            "Reran {} experiment(s) into {}",
            report.experiments.len(),
            store.root().display()
        ));
    }
    Ok(())
}
