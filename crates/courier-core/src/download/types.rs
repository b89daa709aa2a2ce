//! Core data types for download jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DownloadError;

/// Opaque identifier for a download job.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// View as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One file to retrieve, as described by a manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Source URL handed to the transfer tool.
    pub url: String,
    /// Relative destination path, already sanitized.
    pub name: String,
    /// Expected size in bytes. Zero means the manifest did not know.
    #[serde(default)]
    pub size: u64,
}

/// Status of a single file within a job. Terminal files leave the
/// job's live set: completed ones are counted, failed ones are listed
/// by name on the snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Waiting for a worker slot.
    Pending,
    /// A transfer process is running for this file.
    Downloading,
    /// Interrupted by a job pause; restarts from zero on resume.
    Paused,
    /// Fully on disk.
    Completed,
    /// Transfer failed.
    Failed,
}

/// Live progress of a single file, as reported to the UI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileProgress {
    /// Relative destination path of the file.
    pub name: String,
    /// Current status.
    pub status: FileStatus,
    /// Percent complete (0.0 - 100.0) as parsed from tool output.
    pub percent: f64,
    /// Human-readable transfer speed (e.g. "5.2 MiB/s"), when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    /// Transfer speed normalized to bytes per second, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_bps: Option<f64>,
    /// Human-readable time remaining (e.g. "18s"), when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
}

impl FileProgress {
    /// A file that has not started yet.
    #[must_use]
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: FileStatus::Pending,
            percent: 0.0,
            speed: None,
            speed_bps: None,
            eta: None,
        }
    }
}

/// Status of a download job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, directory created, workers not yet transferring.
    Starting,
    /// Workers are transferring files.
    InProgress,
    /// Suspended by the user; partial files kept on disk.
    Paused,
    /// A file failed; the job is held for retry.
    Error,
    /// Cancelled by the user.
    Cancelled,
    /// All files on disk, archive extraction running.
    Extracting,
    /// Everything done.
    Completed,
}

impl JobStatus {
    /// Convert to string representation for persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::Extracting => "extracting",
            Self::Completed => "completed",
        }
    }

    /// True when the job will make no further progress on its own.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }
}

/// Point-in-time view of a job, for API responses and the UI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job identifier.
    pub id: JobId,
    /// Display name taken from the manifest.
    pub name: String,
    /// Current status.
    pub status: JobStatus,
    /// Aggregate percent complete (0.0 - 100.0).
    pub percent: f64,
    /// Bytes confirmed on disk plus estimated in-flight bytes.
    pub downloaded_bytes: u64,
    /// Total bytes expected, zero when the manifest did not know.
    pub total_bytes: u64,
    /// Number of files in the manifest.
    pub file_count: usize,
    /// Number of files fully on disk.
    pub completed_files: usize,
    /// Per-file progress for files with a worker or a pause mark.
    pub files: Vec<FileProgress>,
    /// Names of files whose transfer failed this attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_files: Vec<String>,
    /// Error details if status is Error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DownloadError>,
}

/// Append-only record of a finished (or abandoned) job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Job identifier.
    pub id: JobId,
    /// Display name taken from the manifest.
    pub name: String,
    /// Final status of the job.
    pub status: JobStatus,
    /// Total bytes expected.
    pub total_bytes: u64,
    /// Number of files in the manifest.
    pub file_count: usize,
    /// When the job was accepted.
    pub started_at: DateTime<Utc>,
    /// When the job reached its final status.
    pub finished_at: DateTime<Utc>,
    /// Error details if the job ended in error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DownloadError>,
}
