pub mod list_tasks;
pub mod log;
pub mod rerun;
pub mod run;
pub mod show;
pub mod suite;

use anyhow::{Context as _, Result};
use clap::Args;
use llm_bench_core::ExperimentConfig;
use std::path::Path;

use crate::cli::Commands;
use crate::context::Context;

pub async fn execute(ctx: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::ListTasks => list_tasks::execute(ctx).await,
        Commands::Run(args) => run::execute(ctx, args).await,
        Commands::Suite(args) => suite::execute(ctx, args).await,
        Commands::Rerun(args) => rerun::execute(ctx, args).await,
        Commands::Log(args) => log::execute(ctx, args).await,
        Commands::Show(args) => show::execute(ctx, args).await,
    }
}

/// Generation and retry knobs shared by `run` and `suite`.
#[derive(Debug, Clone, Default, Args)]
pub struct GenerationArgs {
    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Token budget for extended thinking
    #[arg(long)]
    pub thinking_budget: Option<u32>,

    /// Retries after the first attempt of each sample
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Per-attempt timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl GenerationArgs {
    pub fn apply(&self, config: &mut ExperimentConfig) {
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(budget) = self.thinking_budget {
            config.thinking_budget_tokens = budget;
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
    }
}

pub(crate) fn read_text_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
