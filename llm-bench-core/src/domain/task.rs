use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::traits::{PromptFormatter, Scorer, SystemInstructionsFormatter};

/// Prompt used when a task ships no template of its own.
pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "Please process the following metadata according to the task requirements.";

// ===== Samples =====

/// One input row: field name to value, in source column order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Sample(Map<String, Value>);

impl Sample {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Indented JSON rendering used when embedding the sample in a prompt.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl From<Map<String, Value>> for Sample {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for Sample {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(CoreError::Validation(format!(
                "sample must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

/// Expected output for one sample: a field-keyed mapping or free text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct GroundTruth(Value);

impl GroundTruth {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self(Value::String(text.into()))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// The mapping, when the ground truth is structured.
    pub fn as_fields(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }

    pub fn as_text(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// A JSON `null` row means there is nothing to score against.
    pub fn is_absent(&self) -> bool {
        self.0.is_null()
    }

    /// Text form for raw-text comparison: strings as-is, anything else as
    /// compact JSON.
    pub fn to_text(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl From<Value> for GroundTruth {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

// ===== Task Definition =====

/// Immutable benchmark task: samples, optional aligned ground truth, an
/// optional output schema and prompt template, and optional task-specific
/// formatter/scorer overrides.
#[derive(Clone)]
pub struct TaskDefinition {
    name: String,
    samples: Vec<Sample>,
    ground_truth: Option<Vec<GroundTruth>>,
    schema: Option<Value>,
    prompt_template: String,
    system_instructions: Option<String>,
    formatter: Option<Arc<dyn PromptFormatter>>,
    instructions_formatter: Option<Arc<dyn SystemInstructionsFormatter>>,
    scorer: Option<Arc<dyn Scorer>>,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            name: name.into(),
            samples,
            ground_truth: None,
            schema: None,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            system_instructions: None,
            formatter: None,
            instructions_formatter: None,
            scorer: None,
        }
    }

    /// Attach ground truth rows. Fails with `PartialTaskMismatch` unless
    /// there is exactly one row per sample.
    pub fn with_ground_truth(mut self, ground_truth: Vec<GroundTruth>) -> Result<Self> {
        if ground_truth.len() != self.samples.len() {
            return Err(CoreError::PartialTaskMismatch {
                samples: self.samples.len(),
                ground_truth: ground_truth.len(),
            });
        }
        self.ground_truth = Some(ground_truth);
        Ok(self)
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    pub fn with_system_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.system_instructions = Some(instructions.into());
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn PromptFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn with_instructions_formatter(
        mut self,
        formatter: Arc<dyn SystemInstructionsFormatter>,
    ) -> Self {
        self.instructions_formatter = Some(formatter);
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn has_ground_truth(&self) -> bool {
        self.ground_truth.is_some()
    }

    /// Ground truth row aligned with sample `index`, if present and non-null.
    pub fn ground_truth_for(&self, index: usize) -> Option<&GroundTruth> {
        self.ground_truth
            .as_ref()
            .and_then(|rows| rows.get(index))
            .filter(|gt| !gt.is_absent())
    }

    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    pub fn prompt_template(&self) -> &str {
        &self.prompt_template
    }

    pub fn system_instructions(&self) -> Option<&str> {
        self.system_instructions.as_deref()
    }

    pub fn formatter(&self) -> Option<&Arc<dyn PromptFormatter>> {
        self.formatter.as_ref()
    }

    pub fn instructions_formatter(&self) -> Option<&Arc<dyn SystemInstructionsFormatter>> {
        self.instructions_formatter.as_ref()
    }

    pub fn scorer(&self) -> Option<&Arc<dyn Scorer>> {
        self.scorer.as_ref()
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("samples", &self.samples.len())
            .field("ground_truth", &self.ground_truth.as_ref().map(Vec::len))
            .field("has_schema", &self.schema.is_some())
            .field("custom_formatter", &self.formatter.is_some())
            .field("custom_scorer", &self.scorer.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
