//! Snapshot persistence port for the status tracker.

use std::path::PathBuf;

use async_trait::async_trait;

use super::json_file::{JsonFile, StoreError};
use super::models::{Snapshot, SnapshotDocument};

/// Durable storage for the whole status snapshot.
///
/// Whole-value semantics only: `save` replaces everything previously stored.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> Result<Snapshot, StoreError>;
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// `collections_status.json` backed store.
pub struct JsonSnapshotStore {
    file: JsonFile<SnapshotDocument>,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    /// Create the file with an empty snapshot if missing.
    pub async fn ensure_exists(&self) -> Result<(), StoreError> {
        self.file.ensure_exists().await
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(self.file.load_or_default().await?.collections)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let doc = SnapshotDocument {
            collections: snapshot.clone(),
        };
        self.file.save(&doc).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::database::SnapshotRecord;

    #[tokio::test]
    async fn test_reads_existing_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collections_status.json");
        std::fs::write(
            &path,
            r#"{"collections": {"c1": {
                "status": "tsum cs",
                "collection_name": "TSUM Collection Panel 10.12.2025",
                "last_checked": "2025-12-10T19:33:11.123456"
            }}}"#,
        )
        .unwrap();

        let store = JsonSnapshotStore::new(path);
        let snapshot = store.load().await.unwrap();

        let record = &snapshot["c1"];
        assert_eq!(record.status, "tsum cs");
        assert_eq!(record.name, "TSUM Collection Panel 10.12.2025");
    }

    #[tokio::test]
    async fn test_save_replaces_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("s.json"));
        let at = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();

        let mut first = Snapshot::new();
        for id in ["a", "b"] {
            first.insert(
                id.to_string(),
                SnapshotRecord {
                    status: "tsum cs".into(),
                    name: id.to_uppercase(),
                    last_checked: at,
                },
            );
        }
        store.save(&first).await.unwrap();

        let mut second = first.clone();
        second.remove("a");
        store.save(&second).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, second);
        assert!(!loaded.contains_key("a"));
    }
}
