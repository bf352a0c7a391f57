/// Model families that accept an extended-thinking budget.
const THINKING_MODEL_PATTERNS: &[&str] = &[
    "claude-3-7-sonnet",
    "claude-sonnet-4",
    "claude-opus-4",
    "claude-haiku-4",
];

/// Whether `model_id` supports extended thinking. Matches on the model
/// family, so dated and region-prefixed identifiers are recognised too.
pub fn supports_thinking(model_id: &str) -> bool {
    let model_id = model_id.to_ascii_lowercase();
    THINKING_MODEL_PATTERNS
        .iter()
        .any(|pattern| model_id.contains(pattern))
}
