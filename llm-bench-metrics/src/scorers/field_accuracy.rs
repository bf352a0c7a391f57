use llm_bench_core::{GroundTruth, Result, Sample, Scorer};
use serde_json::{Map, Value};

use crate::parsing::extract_fields;

/// Fraction of ground-truth keys whose predicted value is exactly equal.
///
/// Keys missing from the prediction count as mismatches; extra predicted
/// keys are ignored. An empty ground-truth mapping is a vacuous match.
pub fn field_accuracy(prediction: &Map<String, Value>, ground_truth: &Map<String, Value>) -> f64 {
    if ground_truth.is_empty() {
        return 1.0;
    }

    let matches = ground_truth
        .iter()
        .filter(|(key, expected)| prediction.get(key.as_str()) == Some(*expected))
        .count();

    matches as f64 / ground_truth.len() as f64
}

/// Field-level accuracy for tasks whose answers are always structured.
/// Responses without a parseable mapping score 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldAccuracyScorer;

impl Scorer for FieldAccuracyScorer {
    fn name(&self) -> &str {
        "field_accuracy"
    }

    fn score(
        &self,
        prediction: &str,
        ground_truth: &GroundTruth,
        _input: &Sample,
    ) -> Result<Option<f64>> {
        let Some(expected) = ground_truth.as_fields() else {
            return Ok(None);
        };
        Ok(Some(match extract_fields(prediction) {
            Some(predicted) => field_accuracy(&predicted, expected),
            None => 0.0,
        }))
    }
}
