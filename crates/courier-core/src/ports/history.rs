//! History store trait.
//!
//! Finished jobs are recorded to an append-only history so the UI can
//! show past downloads across restarts. The store is a port; the JSON
//! file implementation lives in the download crate.

use async_trait::async_trait;

use crate::download::{DownloadResult, HistoryRecord};

/// Persistence for finished job records.
#[async_trait]
pub trait HistoryStorePort: Send + Sync {
    /// Append a record. Records are never updated in place.
    async fn append(&self, record: HistoryRecord) -> DownloadResult<()>;

    /// List all records, most recent first.
    async fn list(&self) -> DownloadResult<Vec<HistoryRecord>>;

    /// Remove all records.
    async fn clear(&self) -> DownloadResult<()>;
}

/// An in-memory history store for tests.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: std::sync::Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStorePort for MemoryHistoryStore {
    async fn append(&self, record: HistoryRecord) -> DownloadResult<()> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    async fn list(&self) -> DownloadResult<Vec<HistoryRecord>> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        records.reverse();
        Ok(records)
    }

    async fn clear(&self) -> DownloadResult<()> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
