use llm_bench_core::{ExperimentConfig, GroundTruth, PromptFormatter, Sample, TaskDefinition};
use serde_json::Value;
use tracing::warn;

/// Template, then the task schema when present, then the sample as
/// indented JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPromptFormatter;

impl PromptFormatter for DefaultPromptFormatter {
    fn format(
        &self,
        template: &str,
        sample: &Sample,
        _ground_truth: Option<&GroundTruth>,
        schema: Option<&Value>,
    ) -> String {
        let mut prompt = template.to_string();
        if let Some(schema) = schema {
            let rendered =
                serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
            prompt.push_str("\n\nTarget Schema (controlled terminology):\n");
            prompt.push_str(&rendered);
        }
        prompt.push_str("\n\nInput data:\n");
        prompt.push_str(&sample.to_pretty_json());
        prompt
    }
}

/// Instructions for one experiment: the config's, else the task's, else
/// `fallback`, passed through the task's instructions formatter if it has
/// one. A formatter error keeps the unformatted text.
pub fn resolve_system_instructions(
    task: &TaskDefinition,
    config: &ExperimentConfig,
    fallback: Option<&str>,
) -> Option<String> {
    let base = config
        .system_instructions
        .as_deref()
        .or(task.system_instructions())
        .or(fallback)?
        .to_string();

    match task.instructions_formatter() {
        Some(formatter) => match formatter.format(&base) {
            Ok(formatted) => Some(formatted),
            Err(e) => {
                warn!(task = task.name(), error = %e, "System instructions formatter failed, using unformatted text");
                Some(base)
            }
        },
        None => Some(base),
    }
}
