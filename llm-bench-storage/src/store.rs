use async_trait::async_trait;
use llm_bench_core::{ExperimentId, ExperimentRepository, ExperimentResult, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::log::{latest_entries, read_log, LogEntry, LogWriter};
use crate::records::RecordStore;

pub const RECORDS_DIR: &str = "experiments";
pub const LOG_FILE: &str = "experiments_log.jsonl";

/// Result store rooted at a directory:
///
/// ```text
/// <root>/experiments/<id>_results.json   full record, replaced on rerun
/// <root>/experiments_log.jsonl           one summary line per run
/// ```
///
/// The record is written before the log line, so every logged identifier
/// has a readable record.
#[derive(Debug, Clone)]
pub struct FileResultStore {
    root: PathBuf,
    records: RecordStore,
    log: LogWriter,
}

impl FileResultStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let records = RecordStore::new(root.join(RECORDS_DIR));
        let log = LogWriter::open(root.join(LOG_FILE)).await?;
        Ok(Self { root, records, log })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Every logged run, in append order.
    pub async fn history(&self) -> Result<Vec<LogEntry>> {
        read_log(self.log.path()).await
    }

    /// Latest run per identifier, newest first.
    pub async fn latest(&self) -> Result<Vec<LogEntry>> {
        Ok(latest_entries(self.history().await?))
    }
}

#[async_trait]
impl ExperimentRepository for FileResultStore {
    async fn save(&self, result: &ExperimentResult) -> Result<()> {
        let path = self.records.write(result).await?;
        self.log.append(&LogEntry::from(result)).await?;
        info!(
            experiment_id = %result.experiment_id,
            path = %path.display(),
            "Saved experiment"
        );
        Ok(())
    }

    async fn find_by_id(&self, id: &ExperimentId) -> Result<Option<ExperimentResult>> {
        self.records.read(id).await
    }
}
