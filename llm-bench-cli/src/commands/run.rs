use anyhow::{bail, Context as _, Result};
use clap::Args;
use llm_bench_core::{ExperimentConfig, ExperimentRepository};
use std::path::PathBuf;

use super::{read_text_file, GenerationArgs};
use crate::batch::{load_tasks, run_jobs};
use crate::context::{cancel_on_ctrl_c, Context};
use crate::output::spawn_progress;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Task to run; repeat for several. Runs every task when omitted
    #[arg(short, long = "task")]
    pub tasks: Vec<String>,

    /// Model identifier (defaults to the configured default_model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Inline system instructions
    #[arg(long, conflicts_with = "system_instructions_file")]
    pub system_instructions: Option<String>,

    /// File holding the system instructions
    #[arg(long)]
    pub system_instructions_file: Option<PathBuf>,

    /// File holding a prompt template that replaces the task's own
    #[arg(long)]
    pub prompt_template_file: Option<PathBuf>,

    /// Sampling temperature in [0, 2]
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Enable extended thinking
    #[arg(long)]
    pub thinking: bool,

    #[command(flatten)]
    pub generation: GenerationArgs,

    /// Do not write records or log lines
    #[arg(long)]
    pub no_save: bool,
}

impl RunArgs {
    fn experiment_config(&self, base: ExperimentConfig) -> Result<ExperimentConfig> {
        let mut config = base;
        if let Some(instructions) = &self.system_instructions {
            config.system_instructions = Some(instructions.clone());
        }
        if let Some(path) = &self.system_instructions_file {
            config.system_instructions = Some(read_text_file(path)?);
        }
        if let Some(path) = &self.prompt_template_file {
            config.prompt_template = Some(read_text_file(path)?);
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        config.thinking = self.thinking;
        self.generation.apply(&mut config);
        config.validate_config().context("Invalid experiment configuration")?;
        Ok(config)
    }
}

pub async fn execute(ctx: &Context, args: RunArgs) -> Result<()> {
    let model = ctx.model_or_default(args.model.clone())?;
    let config = args.experiment_config(ctx.settings.base_experiment(model))?;

    let loader = ctx.task_loader();
    let names = if args.tasks.is_empty() {
        loader.list()?
    } else {
        args.tasks.clone()
    };
    let (tasks, load_failures) = load_tasks(&loader, &names);
    if tasks.is_empty() && !load_failures.is_empty() {
        bail!("None of the {} task(s) could be loaded", load_failures.len());
    }

    let store = if args.no_save {
        None
    } else {
        Some(ctx.store().await?)
    };

    let mut runner = ctx.runner()?;
    let progress = ctx
        .output
        .is_table()
        .then(|| spawn_progress(runner.enable_progress_tracking()));
    let cancel = cancel_on_ctrl_c();

    let jobs: Vec<_> = tasks.iter().map(|task| (task, config.clone())).collect();
    let repository = store.as_deref().map(|s| s as &dyn ExperimentRepository);
    let mut report = run_jobs(&runner, &jobs, repository, &cancel).await;
    let mut failures = load_failures;
    failures.append(&mut report.failures);
    report.failures = failures;

    drop(runner);
    if let Some(handle) = progress {
        let _ = handle.await;
    }

    ctx.output.batch(&report)?;
    if cancel.is_cancelled() {
        ctx.output.warning("Run interrupted; partial results were kept");
    } else if let Some(store) = &store {
        ctx.output
            .success(&format!("Results written to {}", store.root().display()));
    }
    Ok(())
}
