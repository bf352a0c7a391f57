use anyhow::{Context as _, Result};
use clap::{ArgAction, Args};
use llm_bench_core::ExperimentConfig;
use llm_bench_workflow::{SuiteAxes, SuiteRunner};
use std::path::PathBuf;

use super::{read_text_file, GenerationArgs};
use crate::context::{cancel_on_ctrl_c, Context};
use crate::output::spawn_progress;

#[derive(Debug, Args)]
pub struct SuiteArgs {
    /// Task to run the suite against
    #[arg(short, long)]
    pub task: String,

    /// Model axis; repeat for several
    #[arg(short, long = "model")]
    pub models: Vec<String>,

    /// System instructions axis, one file per value
    #[arg(long = "system-instructions-file")]
    pub system_instructions_files: Vec<PathBuf>,

    /// Also run with no explicit system instructions (task or default ones)
    #[arg(long)]
    pub include_default_instructions: bool,

    /// Prompt template axis, one file per value
    #[arg(long = "prompt-template-file")]
    pub prompt_template_files: Vec<PathBuf>,

    /// Temperature axis; repeat for several
    #[arg(long = "temperature")]
    pub temperatures: Vec<f64>,

    /// Thinking axis, e.g. `--thinking false --thinking true`
    #[arg(long, action = ArgAction::Append)]
    pub thinking: Vec<bool>,

    #[command(flatten)]
    pub generation: GenerationArgs,

    /// Experiments to run at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Do not write records or log lines
    #[arg(long)]
    pub no_save: bool,
}

impl SuiteArgs {
    fn axes(&self) -> Result<SuiteAxes> {
        let instructions = self
            .system_instructions_files
            .iter()
            .map(|path| read_text_file(path))
            .collect::<Result<Vec<_>>>()?;
        let templates = self
            .prompt_template_files
            .iter()
            .map(|path| read_text_file(path))
            .collect::<Result<Vec<_>>>()?;

        let mut axes = SuiteAxes::new()
            .models(self.models.iter().cloned())
            .system_instructions(instructions)
            .prompt_templates(templates)
            .temperatures(self.temperatures.iter().copied())
            .thinking(self.thinking.iter().copied());
        if self.include_default_instructions && !axes.system_instructions.is_empty() {
            axes.system_instructions.insert(0, None);
        }
        Ok(axes)
    }

    fn base_config(&self, base: ExperimentConfig) -> ExperimentConfig {
        let mut config = base;
        self.generation.apply(&mut config);
        config
    }
}

pub async fn execute(ctx: &Context, args: SuiteArgs) -> Result<()> {
    let model = match args.models.first() {
        Some(model) => model.clone(),
        None => ctx.model_or_default(None)?,
    };
    let base = args.base_config(ctx.settings.base_experiment(model));
    let axes = args.axes()?;
    let task = ctx
        .task_loader()
        .load(&args.task)
        .with_context(|| format!("Failed to load task '{}'", args.task))?;

    let mut suite = SuiteRunner::new(ctx.runner()?).with_experiment_concurrency(
        args.concurrency
            .unwrap_or(ctx.settings.experiment_concurrency),
    );
    if !args.no_save {
        suite = suite.with_repository(ctx.store().await?);
    }
    let progress = ctx
        .output
        .is_table()
        .then(|| spawn_progress(suite.enable_progress_tracking()));

    let result = suite
        .run_suite_with_cancel(&task, &axes, &base, cancel_on_ctrl_c())
        .await;

    drop(suite);
    if let Some(handle) = progress {
        let _ = handle.await;
    }

    ctx.output.suite(&result)
}
