use llm_bench_core::{GroundTruth, Result, Sample, Scorer};
use std::collections::HashSet;

/// Jaccard similarity of the lowercased, whitespace-separated word sets.
///
/// Two empty texts are a vacuous match and score 1.0.
pub fn jaccard_similarity(predicted: &str, reference: &str) -> f64 {
    let pred_lower = predicted.to_lowercase();
    let pred_words: HashSet<&str> = pred_lower.split_whitespace().collect();
    let ref_lower = reference.to_lowercase();
    let ref_words: HashSet<&str> = ref_lower.split_whitespace().collect();

    if pred_words.is_empty() && ref_words.is_empty() {
        return 1.0;
    }

    let intersection = pred_words.intersection(&ref_words).count();
    let union = pred_words.union(&ref_words).count();

    intersection as f64 / union as f64
}

/// Scores the raw response text against the stringified ground truth.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaccardScorer;

impl Scorer for JaccardScorer {
    fn name(&self) -> &str {
        "jaccard"
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
        Ok(Some(jaccard_similarity(prediction, &ground_truth.to_text())))
    }
}
