use llm_bench_core::{GroundTruth, Result, Sample, Scorer};
use serde_json::Value;
use std::collections::HashMap;

use super::jaccard::jaccard_similarity;
use crate::parsing::extract_fields;

/// How a schema property is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Controlled vocabulary, identifiers, numbers: exact match.
    Controlled,
    /// Free text: word-level Jaccard similarity.
    FreeText,
}

impl FieldKind {
    /// Classify one JSON-schema property.
    pub fn classify(name: &str, property: &Value) -> Self {
        if property.get("enum").is_some() {
            return FieldKind::Controlled;
        }
        // *_OTHER_SPECIFY fields carry patterns but hold free text
        if property.get("pattern").is_some() && !name.ends_with("_OTHER_SPECIFY") {
            return FieldKind::Controlled;
        }
        match property.get("type").and_then(Value::as_str).unwrap_or("string") {
            "integer" | "number" | "boolean" => FieldKind::Controlled,
            "array" if property.pointer("/items/enum").is_some() => FieldKind::Controlled,
            _ => FieldKind::FreeText,
        }
    }
}

/// Schema-aware scorer mixing exact match and text similarity per field.
///
/// Fields the schema does not describe are treated as controlled. The
/// sample score is the mean of the per-field scores over the ground-truth
/// keys.
#[derive(Debug, Clone, Default)]
pub struct HybridFieldScorer {
    field_kinds: HashMap<String, FieldKind>,
}

impl HybridFieldScorer {
    pub fn from_schema(schema: &Value) -> Self {
        let field_kinds = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| {
                properties
                    .iter()
                    .map(|(name, property)| (name.clone(), FieldKind::classify(name, property)))
                    .collect()
            })
            .unwrap_or_default();
        Self { field_kinds }
    }

    pub fn kind_of(&self, field: &str) -> FieldKind {
        self.field_kinds
            .get(field)
            .copied()
            .unwrap_or(FieldKind::Controlled)
    }
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl Scorer for HybridFieldScorer {
    fn name(&self) -> &str {
        "hybrid_field"
    }

    fn score(
        &self,
        prediction: &str,
        ground_truth: &GroundTruth,
        _input: &Sample,
    ) -> Result<Option<f64>> {
        let Some(expected) = ground_truth.as_fields() else {
            if ground_truth.is_absent() {
                return Ok(None);
            }
            return Ok(Some(jaccard_similarity(prediction, &ground_truth.to_text())));
        };
        let Some(predicted) = extract_fields(prediction) else {
            return Ok(Some(0.0));
        };
        if expected.is_empty() {
            return Ok(Some(1.0));
        }

        let total: f64 = expected
            .iter()
            .map(|(key, truth)| {
                let pred = predicted.get(key);
                match self.kind_of(key) {
                    FieldKind::Controlled => {
                        if pred == Some(truth) {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    FieldKind::FreeText => jaccard_similarity(&value_text(pred), &value_text(Some(truth))),
                }
            })
            .sum();

        Ok(Some(total / expected.len() as f64))
    }
}
