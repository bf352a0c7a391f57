use llm_bench_core::{CoreError, ExperimentId, ExperimentResult, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

const RECORD_SUFFIX: &str = "_results.json";

/// One JSON document per experiment, addressed by identifier.
///
/// Records are written to a temporary sibling and renamed into place, so a
/// reader sees either the previous record or the complete new one.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &ExperimentId) -> PathBuf {
        self.dir.join(format!("{}{}", id, RECORD_SUFFIX))
    }

    pub async fn write(&self, result: &ExperimentResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&result.experiment_id);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", result.experiment_id, Uuid::new_v4().simple()));
        let body = serde_json::to_vec_pretty(result)?;

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(CoreError::Io(e));
        }

        debug!(experiment_id = %result.experiment_id, path = %path.display(), "Wrote experiment record");
        Ok(path)
    }

    pub async fn read(&self, id: &ExperimentId) -> Result<Option<ExperimentResult>> {
        let path = self.path_for(id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Identifiers of every stored record, sorted.
    pub async fn list(&self) -> Result<Vec<ExperimentId>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(RECORD_SUFFIX)) else {
                continue;
            };
            if let Ok(id) = ExperimentId::parse(stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
