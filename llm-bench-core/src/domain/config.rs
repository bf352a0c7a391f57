use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use super::ids::{ConfigDigest, ExperimentId};
use crate::error::{CoreError, Result};

pub const DEFAULT_TEMPERATURE: f64 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_THINKING_BUDGET_TOKENS: u32 = 2048;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ===== Retry Settings =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct RetrySettings {
    /// Retries after the first attempt; `0` means a single attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[validate(range(min = 1.0))]
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

impl RetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// ===== Experiment Configuration =====

/// One fully resolved configuration for running a task.
///
/// Every field except `model_id` has a default, so a partial document
/// deserializes into a complete configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct ExperimentConfig {
    #[validate(length(min = 1, max = 255))]
    pub model_id: String,

    /// Overrides the task's own instructions when set.
    #[serde(default)]
    pub system_instructions: Option<String>,

    /// Overrides the task's default prompt template when set.
    #[serde(default)]
    pub prompt_template: Option<String>,

    #[validate(range(min = 0.0, max = 2.0))]
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[validate(range(min = 1))]
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub thinking: bool,

    #[validate(range(min = 1))]
    #[serde(default = "default_thinking_budget_tokens")]
    pub thinking_budget_tokens: u32,

    #[validate(nested)]
    #[serde(default)]
    pub retry: RetrySettings,

    #[validate(range(min = 1))]
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// The subset of a configuration that can change model output, plus the
/// task name. Hashing this view yields the experiment identifier.
#[derive(Debug, Serialize)]
struct IdentityView<'a> {
    task: &'a str,
    model_id: &'a str,
    system_instructions: Option<&'a str>,
    prompt_template: Option<&'a str>,
    temperature: Option<f64>,
    max_tokens: u32,
    thinking: bool,
    thinking_budget_tokens: Option<u32>,
}

impl ExperimentConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            system_instructions: None,
            prompt_template: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            thinking: false,
            thinking_budget_tokens: DEFAULT_THINKING_BUDGET_TOKENS,
            retry: RetrySettings::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn builder(model_id: impl Into<String>) -> ExperimentConfigBuilder {
        ExperimentConfigBuilder {
            config: Self::new(model_id),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Field validation plus cross-field rules.
    pub fn validate_config(&self) -> Result<()> {
        self.validate()?;
        if self.thinking && self.thinking_budget_tokens >= self.max_tokens {
            return Err(CoreError::Validation(format!(
                "thinking_budget_tokens ({}) must be smaller than max_tokens ({})",
                self.thinking_budget_tokens, self.max_tokens
            )));
        }
        Ok(())
    }

    /// Digest of the output-affecting fields for `task_name`.
    ///
    /// Only instructions set on the config take part; task-level or default
    /// instructions belong to the task and are not hashed.
    pub fn digest(&self, task_name: &str) -> Result<ConfigDigest> {
        let view = IdentityView {
            task: task_name,
            model_id: &self.model_id,
            system_instructions: self.system_instructions.as_deref(),
            prompt_template: self.prompt_template.as_deref(),
            // temperature is not sent when thinking is on; the budget only
            // when it is
            temperature: (!self.thinking).then_some(self.temperature),
            max_tokens: self.max_tokens,
            thinking: self.thinking,
            thinking_budget_tokens: self.thinking.then_some(self.thinking_budget_tokens),
        };
        ConfigDigest::of(&view)
    }

    pub fn experiment_id(&self, task_name: &str) -> Result<ExperimentId> {
        Ok(ExperimentId::from_digest(&self.digest(task_name)?))
    }
}

/// Fluent builder for [`ExperimentConfig`].
#[derive(Debug, Clone)]
pub struct ExperimentConfigBuilder {
    config: ExperimentConfig,
}

impl ExperimentConfigBuilder {
    pub fn system_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.system_instructions = Some(instructions.into());
        self
    }

    /// Read the system instructions from a file reference.
    pub fn system_instructions_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let instructions = std::fs::read_to_string(path).map_err(|e| {
            CoreError::NotFound(format!(
                "system instructions file {}: {}",
                path.display(),
                e
            ))
        })?;
        self.config.system_instructions = Some(instructions);
        Ok(self)
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    pub fn thinking(mut self, enabled: bool) -> Self {
        self.config.thinking = enabled;
        self
    }

    pub fn thinking_budget_tokens(mut self, budget: u32) -> Self {
        self.config.thinking_budget_tokens = budget;
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry.max_retries = max_retries;
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.config.timeout_secs = timeout_secs;
        self
    }

    pub fn build(self) -> Result<ExperimentConfig> {
        self.config.validate_config()?;
        Ok(self.config)
    }
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

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}
