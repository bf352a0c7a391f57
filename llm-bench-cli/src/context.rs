//! Shared state for command execution.

use anyhow::{Context as _, Result};
use llm_bench_client::{InferenceClient, MessagesClient};
use llm_bench_storage::FileResultStore;
use llm_bench_workflow::{CancellationToken, ExperimentRunner, TaskRegistry};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::output::OutputWriter;
use crate::settings::{BenchSettings, API_KEY_ENV};
use crate::tasks::TaskLoader;

pub struct Context {
    pub settings: BenchSettings,
    pub output: OutputWriter,
}

impl Context {
    pub fn new(cli: &Cli) -> Result<Self> {
        let mut settings = BenchSettings::load(cli.config.as_deref())?;
        if let Some(dir) = &cli.tasks_dir {
            settings.tasks_dir = dir.clone();
        }
        if let Some(dir) = &cli.results_dir {
            settings.results_dir = dir.clone();
        }

        Ok(Self {
            settings,
            output: OutputWriter::new(cli.output),
        })
    }

    pub fn task_loader(&self) -> TaskLoader {
        TaskLoader::new(&self.settings.tasks_dir, TaskRegistry::builtin())
    }

    pub async fn store(&self) -> Result<Arc<FileResultStore>> {
        let store = FileResultStore::open(&self.settings.results_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to open results directory {}",
                    self.settings.results_dir.display()
                )
            })?;
        Ok(Arc::new(store))
    }

    pub fn client(&self) -> Result<Arc<dyn InferenceClient>> {
        if self.settings.endpoint.api_key.is_none() {
            warn!("No API key configured; set endpoint.api_key or {}", API_KEY_ENV);
        }
        let client = MessagesClient::new(self.settings.client_config()?)
            .context("Failed to build inference client")?;
        Ok(Arc::new(client))
    }

    pub fn runner(&self) -> Result<ExperimentRunner> {
        let mut runner = ExperimentRunner::new(self.client()?)
            .with_sample_concurrency(self.settings.sample_concurrency);
        if let Some(instructions) = &self.settings.default_system_instructions {
            runner = runner.with_default_system_instructions(instructions);
        }
        Ok(runner)
    }

    /// Model from the command line, else the configured default.
    pub fn model_or_default(&self, model: Option<String>) -> Result<String> {
        model
            .or_else(|| self.settings.default_model.clone())
            .context("No model given; pass --model or set default_model")
    }
}

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing in-flight samples");
            child.cancel();
        }
    });
    token
}
