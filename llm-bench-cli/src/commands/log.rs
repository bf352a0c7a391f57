use anyhow::Result;
use clap::Args;

use crate::context::Context;

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Show every logged run instead of the latest run per experiment
    #[arg(long)]
    pub all: bool,

    /// Only experiments for this task
    #[arg(short, long)]
    pub task: Option<String>,

    /// Only experiments for this model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Maximum number of entries to show
    #[arg(short, long, default_value = "50")]
    pub limit: usize,
}

pub async fn execute(ctx: &Context, args: LogArgs) -> Result<()> {
    let store = ctx.store().await?;
    let mut entries = if args.all {
        let mut history = store.history().await?;
        history.reverse();
        history
    } else {
        store.latest().await?
    };

    entries.retain(|entry| {
        args.task.as_deref().map_or(true, |t| entry.task_name == t)
            && args.model.as_deref().map_or(true, |m| entry.model_id == m)
    });
    entries.truncate(args.limit);

    ctx.output.log_entries(&entries)
}
