//! Loading benchmark tasks from disk.
//!
//! Each task is a directory under the tasks root:
//!
//! ```text
//! tasks/<name>/
//!   input.{json,jsonl,csv,tsv}                samples (required)
//!   ground_truth.{json,jsonl,csv,tsv}         one row per sample
//!   schema.json                               target output schema
//!   default_prompt.txt                        prompt template
//!   system_instructions.txt                   task system instructions
//! ```
//!
//! Delimited files need a header row. Each record becomes an object keyed
//! by the headers, with every cell a string and empty cells null.

use anyhow::{bail, Context as _, Result};
use llm_bench_core::{GroundTruth, Sample, TaskDefinition};
use llm_bench_workflow::TaskRegistry;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

const INPUT_STEM: &str = "input";
const GROUND_TRUTH_STEM: &str = "ground_truth";
const SCHEMA_FILE: &str = "schema.json";
const PROMPT_FILE: &str = "default_prompt.txt";
const SYSTEM_INSTRUCTIONS_FILE: &str = "system_instructions.txt";

pub struct TaskLoader {
    root: PathBuf,
    registry: TaskRegistry,
}

impl TaskLoader {
    pub fn new(root: impl Into<PathBuf>, registry: TaskRegistry) -> Self {
        Self {
            root: root.into(),
            registry,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of every directory under the root that holds an input file,
    /// sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read tasks directory {}", self.root.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || find_data_file(&path, INPUT_STEM).is_none() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load a task by name and attach any registered overrides.
    pub fn load(&self, name: &str) -> Result<TaskDefinition> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            bail!("Task '{}' not found in {}", name, self.root.display());
        }

        let input_path = find_data_file(&dir, INPUT_STEM)
            .with_context(|| format!("Task '{}' has no input file", name))?;
        let samples = read_rows(&input_path)?
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                Sample::try_from(row)
                    .with_context(|| format!("{}: row {}", input_path.display(), i + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut task = TaskDefinition::new(name, samples);

        if let Some(path) = find_data_file(&dir, GROUND_TRUTH_STEM) {
            let rows = read_rows(&path)?.into_iter().map(GroundTruth::from).collect();
            task = task
                .with_ground_truth(rows)
                .with_context(|| format!("Task '{}' has misaligned ground truth", name))?;
        }

        let schema_path = dir.join(SCHEMA_FILE);
        if schema_path.is_file() {
            let text = read_text(&schema_path)?;
            let schema: Value = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", schema_path.display()))?;
            task = task.with_schema(schema);
        }

        if let Some(template) = read_optional_text(&dir.join(PROMPT_FILE))? {
            task = task.with_prompt_template(template);
        }
        if let Some(instructions) = read_optional_text(&dir.join(SYSTEM_INSTRUCTIONS_FILE))? {
            task = task.with_system_instructions(instructions);
        }

        debug!(
            task = name,
            samples = task.len(),
            ground_truth = task.has_ground_truth(),
            overrides = self.registry.has_overrides(name),
            "Loaded task"
        );
        Ok(self.registry.resolve(task))
    }

    pub fn load_all(&self) -> Result<Vec<TaskDefinition>> {
        self.list()?.iter().map(|name| self.load(name)).collect()
    }
}

const DATA_EXTENSIONS: [&str; 4] = ["json", "jsonl", "csv", "tsv"];

fn find_data_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    DATA_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|path| path.is_file())
}

/// Rows from a JSON array, JSON Lines, CSV or TSV file, by extension.
fn read_rows(path: &Path) -> Result<Vec<Value>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") => read_json_lines(path),
        Some("csv") => read_delimited(path, b','),
        Some("tsv") => read_delimited(path, b'\t'),
        _ => read_json_array(path),
    }
}

fn read_json_array(path: &Path) -> Result<Vec<Value>> {
    let text = read_text(path)?;
    match serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?
    {
        Value::Array(rows) => Ok(rows),
        _ => bail!("{} must contain a JSON array", path.display()),
    }
}

fn read_json_lines(path: &Path) -> Result<Vec<Value>> {
    read_text(path)?
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("{}: line {}", path.display(), i + 1))
        })
        .collect()
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Vec<Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("{}: missing header row", path.display()))?
        .clone();

    reader
        .records()
        .enumerate()
        .map(|(i, record)| {
            // header is line 1
            let record = record.with_context(|| format!("{}: line {}", path.display(), i + 2))?;
            let row = headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| {
                    let value = if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    };
                    (header.to_string(), value)
                })
                .collect();
            Ok(Value::Object(row))
        })
        .collect()
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_optional_text(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = read_text(path)?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}
