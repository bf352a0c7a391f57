#![allow(dead_code)]

use llm_bench_core::{ExperimentConfig, GroundTruth, RetrySettings, Sample, TaskDefinition};

/// Config with millisecond backoff so retry tests stay fast.
pub fn fast_config(model: &str, max_retries: u32) -> ExperimentConfig {
    ExperimentConfig::builder(model)
        .retry(RetrySettings {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            multiplier: 2.0,
            jitter: false,
        })
        .build()
        .unwrap()
}

pub fn numbered_samples(count: usize) -> Vec<Sample> {
    (0..count).map(|i| Sample::from_pairs([("id", i)])).collect()
}

pub fn text_task(name: &str, ground_truth: &[Option<&str>]) -> TaskDefinition {
    let rows = ground_truth
        .iter()
        .map(|gt| match gt {
            Some(text) => GroundTruth::text(*text),
            None => GroundTruth::new(serde_json::Value::Null),
        })
        .collect();
    TaskDefinition::new(name, numbered_samples(ground_truth.len()))
        .with_ground_truth(rows)
        .unwrap()
}

/// Whether a formatted prompt embeds the sample with this id.
pub fn prompt_has_id(prompt: &str, id: usize) -> bool {
    prompt.contains(&format!("\"id\": {}\n", id))
}
