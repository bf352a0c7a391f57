use llm_bench_core::{ExperimentMetrics, SampleResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreDistribution {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p90: f64,
    pub count: usize,
}

pub struct MetricAggregator;

impl MetricAggregator {
    /// Distribution of a set of scores; `None` for an empty set.
    pub fn aggregate(values: &[f64]) -> Option<ScoreDistribution> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let sum: f64 = values.iter().sum();
        let mean = sum / values.len() as f64;
        let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;

        Some(ScoreDistribution {
            mean,
            median: Self::median(&sorted),
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p90: Self::percentile(&sorted, 90.0),
            count: values.len(),
        })
    }

    /// Aggregate per-sample results into experiment metrics.
    ///
    /// Unscored samples count towards `total_samples` but are excluded from
    /// every score statistic. With no samples nothing failed, so the success
    /// rate is 1.0; incompleteness is reported by the run status instead.
    pub fn summarize(samples: &[SampleResult]) -> ExperimentMetrics {
        let total_samples = samples.len();
        let successful_runs = samples.iter().filter(|s| s.succeeded()).count();
        let scores: Vec<f64> = samples.iter().filter_map(|s| s.score).collect();
        let distribution = Self::aggregate(&scores);

        ExperimentMetrics {
            total_samples,
            successful_runs,
            failed_runs: total_samples - successful_runs,
            success_rate: if total_samples == 0 {
                1.0
            } else {
                successful_runs as f64 / total_samples as f64
            },
            num_scored: scores.len(),
            average_score: distribution.as_ref().map(|d| d.mean),
            min_score: distribution.as_ref().map(|d| d.min),
            max_score: distribution.as_ref().map(|d| d.max),
            median_score: distribution.as_ref().map(|d| d.median),
            std_dev: distribution.as_ref().map(|d| d.std_dev),
        }
    }

    fn median(sorted_values: &[f64]) -> f64 {
        let mid = sorted_values.len() / 2;
        if sorted_values.len() % 2 == 0 {
            (sorted_values[mid - 1] + sorted_values[mid]) / 2.0
        } else {
            sorted_values[mid]
        }
    }

    fn percentile(sorted_values: &[f64], percentile: f64) -> f64 {
        if sorted_values.is_empty() {
            return 0.0;
        }
        let index = (percentile / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
        sorted_values[index.min(sorted_values.len() - 1)]
    }
}
