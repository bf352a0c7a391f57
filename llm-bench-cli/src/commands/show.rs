use anyhow::{bail, Result};
use clap::Args;
use llm_bench_core::{ExperimentId, ExperimentRepository};

use crate::context::Context;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Experiment identifier (16 hex characters)
    pub id: String,
}

pub async fn execute(ctx: &Context, args: ShowArgs) -> Result<()> {
    let id = ExperimentId::parse(&args.id)?;
    let store = ctx.store().await?;
    match store.find_by_id(&id).await? {
        Some(result) => ctx.output.experiment(&result),
        None => bail!("No record for experiment {}", id),
    }
}
