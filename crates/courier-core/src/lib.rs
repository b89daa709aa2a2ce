//! Core domain types and port definitions for courier.
//!
//! This crate holds everything the download orchestration engine and its
//! adapters share: the manifest wire shapes, job/file progress types, the
//! serializable error taxonomy, the job event union, and the port traits
//! that adapters implement (event emission, history persistence).
//!
//! No adapter-specific dependencies live here.

pub mod download;
pub mod manifest;
pub mod ports;
pub mod sanitize;

// Re-export commonly used types for convenience
pub use download::{
    DownloadError, DownloadResult, FileEntry, FileProgress, FileStatus, HistoryRecord, JobEvent,
    JobId, JobSnapshot, JobStatus,
};
pub use manifest::Manifest;
pub use ports::{EngineConfig, HistoryStorePort, JobEventEmitterPort, MemoryHistoryStore, NoopJobEmitter};
pub use sanitize::{resolve_inside, sanitize_rel_path};
