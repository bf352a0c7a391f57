//! Harness settings: `config/default.toml`, then `config/local.toml`, then
//! an explicit `--config` file, then `LLM_BENCH__*` environment variables.

use anyhow::{Context as _, Result};
use config::{Config as ConfigLoader, Environment, File};
use llm_bench_client::ClientConfig;
use llm_bench_core::{
    ExperimentConfig, RetrySettings, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
    DEFAULT_THINKING_BUDGET_TOKENS, DEFAULT_TIMEOUT_SECS,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Read when `endpoint.api_key` is not configured.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Defaults applied to every experiment the CLI builds.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentDefaults {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_thinking_budget_tokens")]
    pub thinking_budget_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for ExperimentDefaults {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            thinking_budget_tokens: default_thinking_budget_tokens(),
            timeout_secs: default_timeout_secs(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchSettings {
    #[serde(default)]
    pub endpoint: EndpointSettings,
    #[serde(default = "default_tasks_dir")]
    pub tasks_dir: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Used when neither the experiment nor the task has instructions.
    #[serde(default)]
    pub default_system_instructions: Option<String>,
    #[serde(default)]
    pub experiment: ExperimentDefaults,
    #[serde(default = "default_sample_concurrency")]
    pub sample_concurrency: usize,
    #[serde(default = "default_experiment_concurrency")]
    pub experiment_concurrency: usize,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            endpoint: EndpointSettings::default(),
            tasks_dir: default_tasks_dir(),
            results_dir: default_results_dir(),
            default_model: None,
            default_system_instructions: None,
            experiment: ExperimentDefaults::default(),
            sample_concurrency: default_sample_concurrency(),
            experiment_concurrency: default_experiment_concurrency(),
        }
    }
}

impl BenchSettings {
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("LLM_BENCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read settings")?;

        let mut settings: Self = config
            .try_deserialize()
            .context("Failed to parse settings")?;
        if settings.endpoint.api_key.is_none() {
            settings.endpoint.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        }
        Ok(settings)
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut builder = ClientConfig::builder(&self.endpoint.base_url)
            .api_version(&self.endpoint.api_version)
            .timeout(Duration::from_secs(self.endpoint.request_timeout_secs))
            .connect_timeout(Duration::from_secs(self.endpoint.connect_timeout_secs));
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.api_key(key);
        }
        builder.build().context("Invalid endpoint settings")
    }

    /// Experiment config for `model` with the configured defaults.
    pub fn base_experiment(&self, model: impl Into<String>) -> ExperimentConfig {
        let defaults = &self.experiment;
        ExperimentConfig {
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            thinking_budget_tokens: defaults.thinking_budget_tokens,
            timeout_secs: defaults.timeout_secs,
            retry: defaults.retry.clone(),
            ..ExperimentConfig::new(model)
        }
    }
}

fn default_base_url() -> String {
    llm_bench_client::config::DEFAULT_BASE_URL.to_string()
}

fn default_api_version() -> String {
    llm_bench_client::config::DEFAULT_API_VERSION.to_string()
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_thinking_budget_tokens() -> u32 {
    DEFAULT_THINKING_BUDGET_TOKENS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_tasks_dir() -> PathBuf {
    PathBuf::from("tasks")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_sample_concurrency() -> usize {
    4
}

fn default_experiment_concurrency() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = BenchSettings::default();
        assert_eq!(settings.sample_concurrency, 4);
        assert_eq!(settings.experiment_concurrency, 1);
        assert_eq!(settings.endpoint.api_version, "2023-06-01");

        let config = settings.base_experiment("m");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.retry.max_retries, 3);
    }
}
