use llm_bench_core::{GroundTruth, Result, Sample, Scorer};

use super::field_accuracy::field_accuracy;
use super::jaccard::jaccard_similarity;
use crate::parsing::extract_fields;

/// Scorer used when a task does not supply its own.
///
/// - structured ground truth and a parseable structured prediction:
///   field-level accuracy over the ground-truth keys
/// - anything else: Jaccard word similarity between the raw response and
///   the ground truth's text form
/// - absent ground truth: unscorable (`None`)
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScorer;

impl Scorer for DefaultScorer {
    fn name(&self) -> &str {
        "default"
    }

    fn score(
        &self,
        prediction: &str,
        ground_truth: &GroundTruth,
        _input: &Sample,
    ) -> Result<Option<f64>> {
        if ground_truth.is_absent() {
            return Ok(None);
        }

        if let Some(expected) = ground_truth.as_fields() {
            if let Some(predicted) = extract_fields(prediction) {
                return Ok(Some(field_accuracy(&predicted, expected)));
            }
            tracing::debug!("prediction has no parseable mapping, falling back to text similarity");
        }

        Ok(Some(jaccard_similarity(prediction, &ground_truth.to_text())))
    }
}
