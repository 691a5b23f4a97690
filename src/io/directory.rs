//! File-backed member directory
//!
//! Loads members from a JSON array and answers card fragment lookups
//! from memory. Newest-updated members come first, matching how the
//! member search lists results.

use crate::domain::{MemberId, MemberRef};
use crate::io::ports::MemberDirectory;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Member row as stored in the members file
#[derive(Debug, Clone, Deserialize)]
pub struct MemberRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub card_id: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemberRecord {
    fn to_member_ref(&self) -> MemberRef {
        MemberRef {
            id: MemberId(self.id),
            display_name: format!("{} {}", self.first_name, self.last_name).trim().to_string(),
            card_identifier: self.card_id.clone(),
        }
    }
}

/// In-memory snapshot of the directory
#[derive(Debug, Default)]
struct DirectoryIndex {
    /// Ordered newest-updated first
    members: Vec<MemberRef>,
}

impl DirectoryIndex {
    fn build(mut records: Vec<MemberRecord>) -> Self {
        // Stable sort keeps file order for equal timestamps
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Self { members: records.iter().map(MemberRecord::to_member_ref).collect() }
    }

    fn find(&self, fragment: &str) -> Vec<MemberRef> {
        if fragment.is_empty() {
            return Vec::new();
        }

        self.members.iter().filter(|m| m.card_identifier.contains(fragment)).cloned().collect()
    }
}

/// Member directory loaded from a JSON file
pub struct FileMemberDirectory {
    source: Option<PathBuf>,
    index: RwLock<DirectoryIndex>,
}

impl FileMemberDirectory {
    /// Load members from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let records = Self::read_records(path)?;
        info!(file_path = %path.display(), members = %records.len(), "member_directory_loaded");
        Ok(Self {
            source: Some(path.to_path_buf()),
            index: RwLock::new(DirectoryIndex::build(records)),
        })
    }

    /// Build a directory from records already in memory
    pub fn from_records(records: Vec<MemberRecord>) -> Self {
        Self { source: None, index: RwLock::new(DirectoryIndex::build(records)) }
    }

    fn read_records(path: &Path) -> anyhow::Result<Vec<MemberRecord>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read members file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse members file {}", path.display()))
    }

    /// Re-read the members file. A failed reload keeps the previous snapshot.
    pub fn reload(&self) -> anyhow::Result<usize> {
        let Some(ref path) = self.source else {
            return Ok(self.len());
        };
        let records = Self::read_records(path)?;
        let count = records.len();
        *self.index.write() = DirectoryIndex::build(records);
        info!(file_path = %path.display(), members = %count, "member_directory_reloaded");
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.index.read().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemberDirectory for FileMemberDirectory {
    async fn find_by_card_fragment(&self, fragment: &str) -> anyhow::Result<Vec<MemberRef>> {
        let found = self.index.read().find(fragment);
        debug!(fragment_len = %fragment.len(), found = %found.len(), "directory_lookup");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record(id: i64, card: &str, updated: Option<&str>) -> MemberRecord {
        MemberRecord {
            id,
            first_name: format!("First{}", id),
            last_name: format!("Last{}", id),
            card_id: card.to_string(),
            updated_at: updated.map(|s| s.parse().unwrap()),
        }
    }

    #[tokio::test]
    async fn test_fragment_match() {
        let directory = FileMemberDirectory::from_records(vec![
            record(1, "000012345678", None),
            record(2, "12345678", None),
            record(3, "99999999", None),
        ]);

        let found = directory.find_by_card_fragment("12345678").await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![MemberId(1), MemberId(2)]);

        let found = directory.find_by_card_fragment("9999").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].display_name, "First3 Last3");

        assert!(directory.find_by_card_fragment("4242").await.unwrap().is_empty());
        assert!(directory.find_by_card_fragment("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_newest_first() {
        let directory = FileMemberDirectory::from_records(vec![
            record(1, "11112222", Some("2026-01-01T10:00:00Z")),
            record(2, "11113333", Some("2026-03-01T10:00:00Z")),
            record(3, "11114444", None),
        ]);

        let found = directory.find_by_card_fragment("1111").await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![MemberId(2), MemberId(1), MemberId(3)]);
    }

    #[tokio::test]
    async fn test_load_and_reload() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": 1, "first_name": "Ana", "last_name": "Kovač", "card_id": "12345678"}}]"#
        )
        .unwrap();
        file.flush().unwrap();

        let directory = FileMemberDirectory::from_file(file.path()).unwrap();
        assert_eq!(directory.len(), 1);

        std::fs::write(
            file.path(),
            r#"[{"id": 1, "first_name": "Ana", "last_name": "Kovač", "card_id": "12345678"},
                {"id": 2, "first_name": "Ivo", "last_name": "Horvat", "card_id": "87654321"}]"#,
        )
        .unwrap();
        assert_eq!(directory.reload().unwrap(), 2);

        // Broken file keeps the previous snapshot
        std::fs::write(file.path(), "not json").unwrap();
        assert!(directory.reload().is_err());
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let err = FileMemberDirectory::from_file("/nonexistent/members.json").err().unwrap();
        assert!(err.to_string().contains("Failed to read members file"));
    }
}
