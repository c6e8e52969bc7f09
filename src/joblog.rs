// Per-job persistent log, one JSON object per line.
//
// The log survives the in-memory queue so a consumer can inspect what
// a finished or failed job did. Retry truncates it along with the
// job's artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::job::JobId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub ts: DateTime<Utc>,
    pub stage: String,
    pub detail: String,
}

impl JobLogEntry {
    pub fn new(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            stage: stage.into(),
            detail: detail.into(),
        }
    }
}

/// Append-only log file for one job.
#[derive(Debug, Clone)]
pub struct JobLog {
    path: PathBuf,
}

impl JobLog {
    pub fn new(logs_dir: &Path, job_id: JobId) -> Self {
        Self {
            path: logs_dir.join(format!("{}.log.jsonl", job_id)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &JobLogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn load(&self) -> Result<Vec<JobLogEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    /// Delete the log file. Missing files are not an error.
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
