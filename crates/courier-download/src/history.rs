//! JSON-file history store.
//!
//! Finished jobs are appended to a single JSON file, newest first, so
//! the UI can show past downloads across restarts. The file is the only
//! durable state the engine owns.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::{DownloadError, DownloadResult, HistoryRecord, HistoryStorePort};

/// History persisted as a JSON array in one file.
pub struct JsonHistoryStore {
    path: PathBuf,
    // Serializes read-modify-write cycles; the file is small.
    lock: Mutex<()>,
}

impl JsonHistoryStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> DownloadResult<Vec<HistoryRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                DownloadError::other(format!("history file is corrupt: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(DownloadError::from_io_error(&e)),
        }
    }

    async fn write_all(&self, records: &[HistoryRecord]) -> DownloadResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::from_io_error(&e))?;
        }
        let raw = serde_json::to_string_pretty(records)
            .map_err(|e| DownloadError::other(format!("failed to encode history: {e}")))?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| DownloadError::from_io_error(&e))
    }
}

#[async_trait]
impl HistoryStorePort for JsonHistoryStore {
    async fn append(&self, record: HistoryRecord) -> DownloadResult<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await.unwrap_or_default();
        records.insert(0, record);
        self.write_all(&records).await
    }

    async fn list(&self) -> DownloadResult<Vec<HistoryRecord>> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    async fn clear(&self) -> DownloadResult<()> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DownloadError::from_io_error(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_core::{JobId, JobStatus};

    fn record(name: &str) -> HistoryRecord {
        HistoryRecord {
            id: JobId::new(),
            name: name.to_string(),
            status: JobStatus::Completed,
            total_bytes: 100,
            file_count: 1,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_append_and_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("history.json"));

        store.append(record("first")).await.unwrap();
        store.append(record("second")).await.unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "second");
        assert_eq!(records[1].name, "first");
    }

    #[tokio::test]
    async fn test_missing_file_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("nope.json"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("history.json"));
        store.append(record("a")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        // Clearing an already-empty store is fine.
        store.clear().await.unwrap();
    }
}
