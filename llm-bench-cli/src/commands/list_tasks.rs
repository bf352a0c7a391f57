use anyhow::Result;

use crate::context::Context;
use crate::output::TaskSummary;

pub async fn execute(ctx: &Context) -> Result<()> {
    let loader = ctx.task_loader();
    let summaries: Vec<TaskSummary> = loader
        .load_all()?
        .iter()
        .map(|task| TaskSummary {
            name: task.name().to_string(),
            samples: task.len(),
            ground_truth: task.has_ground_truth(),
            schema: task.schema().is_some(),
            scorer: task.scorer().map(|s| s.name().to_string()),
        })
        .collect();

    ctx.output.tasks(&summaries)
}
