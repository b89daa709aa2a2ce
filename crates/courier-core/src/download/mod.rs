//! Download domain: job types, events, and errors.

pub mod errors;
pub mod events;
pub mod types;

pub use errors::{DownloadError, DownloadResult};
pub use events::JobEvent;
pub use types::{
    FileEntry, FileProgress, FileStatus, HistoryRecord, JobId, JobSnapshot, JobStatus,
};
