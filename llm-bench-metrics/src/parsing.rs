//! Extraction of structured output from free-form model responses.
//!
//! Models frequently wrap JSON in prose or markdown fences. Extraction tries,
//! in order: the whole response, each fenced code block, and finally the
//! outermost `{ ... }` span. Only objects and arrays count as structured;
//! malformed content never raises and simply yields `None`.

use llm_bench_core::Prediction;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
    })
}

fn parse_structured(candidate: &str) -> Option<Value> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

/// Find the first embedded JSON object or array in `text`.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(value) = parse_structured(text) {
        return Some(value);
    }

    for captures in fence_regex().captures_iter(text) {
        if let Some(value) = captures.get(1).and_then(|m| parse_structured(m.as_str())) {
            return Some(value);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        return parse_structured(&text[start..=end]);
    }
    None
}

/// Like [`extract_json`] but only accepts a field-keyed mapping.
pub fn extract_fields(text: &str) -> Option<Map<String, Value>> {
    match extract_json(text) {
        Some(Value::Object(fields)) => Some(fields),
        _ => None,
    }
}

/// Parse a raw response into the prediction recorded on a sample.
pub fn parse_prediction(text: &str) -> Prediction {
    match extract_json(text) {
        Some(value) => Prediction::Structured(value),
        None => Prediction::Text(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn test_fenced_json() {
        let text = "Here you go:\n```json\n{\"a\": \"x\"}\n```\nLet me know.";
        assert_eq!(extract_json(text), Some(json!({"a": "x"})));
    }

    #[test]
    fn test_bare_fence() {
        let text = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json(text), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_braces_in_prose() {
        let text = "The answer is {\"b\": true} as requested.";
        assert_eq!(extract_json(text), Some(json!({"b": true})));
    }

    #[test]
    fn test_malformed_is_none() {
        assert_eq!(extract_json("{\"a\": oops}"), None);
        assert_eq!(extract_json("```json\n{not json\n```"), None);
        assert_eq!(extract_json("no structure here"), None);
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn test_scalars_are_not_structured() {
        assert_eq!(extract_json("42"), None);
        assert_eq!(extract_json("\"quoted\""), None);
    }

    #[test]
    fn test_parse_prediction_falls_back_to_text() {
        assert_eq!(
            parse_prediction("family history"),
            Prediction::Text("family history".into())
        );
        assert!(parse_prediction("{\"a\": 1}").is_structured());
    }

    #[test]
    fn test_extract_fields_rejects_arrays() {
        assert!(extract_fields("[1]").is_none());
        assert!(extract_fields("{\"k\": 1}").is_some());
    }
}
