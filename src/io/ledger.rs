//! Visit ledger - appends visit records to file
//!
//! Visits are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::{MemberId, VisitRecord, VisitSource};
use crate::io::ports::VisitLedger;
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// JSONL-backed visit ledger
pub struct JsonlVisitLedger {
    file_path: PathBuf,
    /// Serializes appends so concurrent writes never interleave
    write_lock: Mutex<()>,
}

impl JsonlVisitLedger {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        info!(file_path = %file_path.display(), "visit_ledger_initialized");
        Self { file_path, write_lock: Mutex::new(()) }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Append a line to the ledger file
    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;

        // Create parent directories if they don't exist
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.file_path).await?;
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes()).await?;
        file.flush().await
    }

    /// Read every record back, oldest first
    pub async fn read_all(&self) -> anyhow::Result<Vec<VisitRecord>> {
        let content = match fs::read_to_string(&self.file_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read ledger {}", self.file_path.display())
                })
            }
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("Malformed ledger line {} in {}", i + 1, self.file_path.display())
                })
            })
            .collect()
    }
}

#[async_trait]
impl VisitLedger for JsonlVisitLedger {
    async fn record_visit(
        &self,
        member_id: MemberId,
        source: VisitSource,
    ) -> anyhow::Result<VisitRecord> {
        let record = VisitRecord::new(member_id, source);
        let json = serde_json::to_string(&record).context("Failed to serialize visit record")?;

        self.append_line(&json)
            .await
            .with_context(|| format!("Failed to append to {}", self.file_path.display()))?;

        debug!(member_id = %member_id, source = %source.as_str(), "visit_appended");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_record_and_read_back() {
        let dir = tempdir().unwrap();
        let ledger = JsonlVisitLedger::new(dir.path().join("nested/visits.jsonl"));

        ledger.record_visit(MemberId(1), VisitSource::Scan).await.unwrap();
        ledger.record_visit(MemberId(2), VisitSource::Manual).await.unwrap();

        let records = ledger.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].member_id, MemberId(1));
        assert_eq!(records[0].source, VisitSource::Scan);
        assert_eq!(records[1].source, VisitSource::Manual);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let ledger = JsonlVisitLedger::new(dir.path().join("none.jsonl"));
        assert!(ledger.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = tempdir().unwrap();
        // A directory where the file should be makes the open fail
        let path = dir.path().join("visits.jsonl");
        std::fs::create_dir(&path).unwrap();
        let ledger = JsonlVisitLedger::new(&path);

        let err = ledger.record_visit(MemberId(1), VisitSource::Scan).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to append"));
    }
}
