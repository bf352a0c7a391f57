//! Append-only experiment log, one JSON line per finished experiment.
//!
//! All appends go through a single writer task that owns the file handle,
//! so concurrent experiments never interleave partial lines. Reading is
//! tolerant: the log is shared and hand-merged across branches, so blank
//! lines, merge-conflict markers and unparseable lines are skipped.

use chrono::{DateTime, Utc};
use llm_bench_core::{
    ConfigDigest, CoreError, ExperimentId, ExperimentMetrics, ExperimentResult, Result, RunStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const MERGE_MARKERS: [&str; 3] = ["<<<<<<<", "=======", ">>>>>>>"];

// ===== Entries =====

/// Summary of one run; no per-sample detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub experiment_id: ExperimentId,
    pub task_name: String,
    pub model_id: String,
    pub config_digest: ConfigDigest,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: u64,
    pub status: RunStatus,
    #[serde(default)]
    pub expected_samples: usize,
    pub metrics: ExperimentMetrics,
}

impl From<&ExperimentResult> for LogEntry {
    fn from(result: &ExperimentResult) -> Self {
        Self {
            experiment_id: result.experiment_id.clone(),
            task_name: result.task_name.clone(),
            model_id: result.config.model_id.clone(),
            config_digest: result.config_digest.clone(),
            timestamp: result.timestamp,
            duration_ms: result.duration_ms,
            status: result.status.clone(),
            expected_samples: result.expected_samples,
            metrics: result.metrics.clone(),
        }
    }
}

// ===== Writer =====

struct AppendCommand {
    line: String,
    ack: oneshot::Sender<io::Result<()>>,
}

/// Handle to the single task that appends to the log file.
#[derive(Debug, Clone)]
pub struct LogWriter {
    tx: mpsc::Sender<AppendCommand>,
    path: Arc<PathBuf>,
}

impl LogWriter {
    /// Open (creating if needed) the log at `path` and start the writer task.
    /// Must be called inside a Tokio runtime.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run_writer(file, rx));
        debug!(path = %path.display(), "Log writer started");

        Ok(Self {
            tx,
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry; resolves once the line is written.
    pub async fn append(&self, entry: &LogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let (ack, done) = oneshot::channel();
        self.tx
            .send(AppendCommand { line, ack })
            .await
            .map_err(|_| CoreError::InvalidState("log writer has stopped".to_string()))?;
        done.await
            .map_err(|_| CoreError::InvalidState("log writer dropped the append".to_string()))?
            .map_err(CoreError::Io)
    }
}

async fn run_writer(mut file: fs::File, mut rx: mpsc::Receiver<AppendCommand>) {
    while let Some(AppendCommand { line, ack }) = rx.recv().await {
        let mut buf = line.into_bytes();
        buf.push(b'\n');
        let written = match file.write_all(&buf).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = &written {
            warn!(error = %e, "Failed to append to experiment log");
        }
        let _ = ack.send(written);
    }
}

// ===== Reading =====

/// Parse log text, skipping anything that is not a complete entry.
pub fn parse_log(text: &str) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || MERGE_MARKERS.iter().any(|m| line.starts_with(m)) {
            continue;
        }
        match serde_json::from_str::<LogEntry>(line) {
            Ok(entry) if !entry.experiment_id.as_str().is_empty() => entries.push(entry),
            Ok(_) => debug!(line = number + 1, "Skipping log entry without an identifier"),
            Err(e) => debug!(line = number + 1, error = %e, "Skipping unparseable log line"),
        }
    }
    entries
}

/// Every entry in the log at `path`; a missing log is empty.
pub async fn read_log(path: impl AsRef<Path>) -> Result<Vec<LogEntry>> {
    match fs::read_to_string(path.as_ref()).await {
        Ok(text) => Ok(parse_log(&text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// One entry per identifier, the most recent run winning, newest first.
pub fn latest_entries(entries: Vec<LogEntry>) -> Vec<LogEntry> {
    let mut latest: HashMap<ExperimentId, LogEntry> = HashMap::new();
    for entry in entries {
        match latest.get(&entry.experiment_id) {
            Some(existing) if existing.timestamp > entry.timestamp => {}
            _ => {
                latest.insert(entry.experiment_id.clone(), entry);
            }
        }
    }
    let mut entries: Vec<LogEntry> = latest.into_values().collect();
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.experiment_id.cmp(&b.experiment_id))
    });
    entries
}
