//! Per-task plugin lookup.
//!
//! Custom scorers and formatters are registered under a task name and
//! attached to a [`TaskDefinition`] once, when the task is loaded. Tasks
//! without a registration keep the default behaviour.

use llm_bench_core::{PromptFormatter, Scorer, SystemInstructionsFormatter, TaskDefinition};
use llm_bench_metrics::HybridFieldScorer;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds a scorer from the loaded task, e.g. to read its schema.
pub type ScorerFactory = Arc<dyn Fn(&TaskDefinition) -> Arc<dyn Scorer> + Send + Sync>;

#[derive(Default, Clone)]
pub struct TaskRegistry {
    scorers: HashMap<String, ScorerFactory>,
    formatters: HashMap<String, Arc<dyn PromptFormatter>>,
    instructions_formatters: HashMap<String, Arc<dyn SystemInstructionsFormatter>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrations shipped with the harness.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_scorer_factory("htan_family_history", |task| {
            let scorer = match task.schema() {
                Some(schema) => HybridFieldScorer::from_schema(schema),
                None => HybridFieldScorer::default(),
            };
            Arc::new(scorer)
        });
        registry
    }

    pub fn register_scorer(&mut self, task: impl Into<String>, scorer: Arc<dyn Scorer>) -> &mut Self {
        self.scorers
            .insert(task.into(), Arc::new(move |_: &TaskDefinition| scorer.clone()));
        self
    }

    pub fn register_scorer_factory<F>(&mut self, task: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&TaskDefinition) -> Arc<dyn Scorer> + Send + Sync + 'static,
    {
        self.scorers.insert(task.into(), Arc::new(factory));
        self
    }

    pub fn register_formatter(
        &mut self,
        task: impl Into<String>,
        formatter: Arc<dyn PromptFormatter>,
    ) -> &mut Self {
        self.formatters.insert(task.into(), formatter);
        self
    }

    pub fn register_instructions_formatter(
        &mut self,
        task: impl Into<String>,
        formatter: Arc<dyn SystemInstructionsFormatter>,
    ) -> &mut Self {
        self.instructions_formatters.insert(task.into(), formatter);
        self
    }

    pub fn has_overrides(&self, task: &str) -> bool {
        self.scorers.contains_key(task)
            || self.formatters.contains_key(task)
            || self.instructions_formatters.contains_key(task)
    }

    /// Attach any registered overrides to `task`.
    pub fn resolve(&self, mut task: TaskDefinition) -> TaskDefinition {
        let name = task.name().to_string();
        if let Some(factory) = self.scorers.get(&name) {
            let scorer = factory(&task);
            debug!(task = %name, scorer = scorer.name(), "Using custom scorer");
            task = task.with_scorer(scorer);
        }
        if let Some(formatter) = self.formatters.get(&name) {
            debug!(task = %name, "Using custom prompt formatter");
            task = task.with_formatter(formatter.clone());
        }
        if let Some(formatter) = self.instructions_formatters.get(&name) {
            debug!(task = %name, "Using custom system instructions formatter");
            task = task.with_instructions_formatter(formatter.clone());
        }
        task
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scorers: Vec<_> = self.scorers.keys().collect();
        scorers.sort();
        let mut formatters: Vec<_> = self.formatters.keys().collect();
        formatters.sort();
        f.debug_struct("TaskRegistry")
            .field("scorers", &scorers)
            .field("formatters", &formatters)
            .field("instructions_formatters", &self.instructions_formatters.len())
            .finish()
    }
}
