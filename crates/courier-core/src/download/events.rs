//! Job events - discriminated union for all job state changes.

use serde::{Deserialize, Serialize};

use super::errors::DownloadError;
use super::types::{FileProgress, JobId};

/// Single discriminated union for all job events.
///
/// Consumers (a desktop frontend, the CLI renderer) handle this as a
/// serde-tagged union.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job has been accepted and its directory created.
    JobStarted {
        /// Job identifier.
        id: JobId,
        /// Display name taken from the manifest.
        name: String,
        /// Number of files to retrieve.
        file_count: usize,
        /// Total bytes expected, zero when unknown.
        total_bytes: u64,
    },

    /// Periodic aggregate progress update.
    JobProgress {
        /// Job identifier.
        id: JobId,
        /// Aggregate percent complete (0.0 - 100.0).
        percent: f64,
        /// Bytes confirmed on disk plus estimated in-flight bytes.
        downloaded_bytes: u64,
        /// Total bytes expected, zero when unknown.
        total_bytes: u64,
        /// Human-readable speed of the fastest active transfer.
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<String>,
        /// Human-readable time remaining, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        eta: Option<String>,
        /// Per-file progress.
        files: Vec<FileProgress>,
    },

    /// Job suspended by the user.
    JobPaused {
        /// Job identifier.
        id: JobId,
    },

    /// Job resumed after a pause or a failed attempt.
    JobResumed {
        /// Job identifier.
        id: JobId,
    },

    /// All files on disk; archive extraction has begun.
    ExtractionStarted {
        /// Job identifier.
        id: JobId,
        /// Number of archives found in the download directory.
        archive_count: usize,
    },

    /// Job finished; files (and extracted archives, if any) are on disk.
    JobCompleted {
        /// Job identifier.
        id: JobId,
        /// Set when downloads succeeded but extraction did not.
        #[serde(skip_serializing_if = "Option::is_none")]
        extraction_error: Option<String>,
    },

    /// A file failed and the job is held for retry.
    JobError {
        /// Job identifier.
        id: JobId,
        /// Classified error.
        error: DownloadError,
        /// User-facing rendering of the error.
        message: String,
    },

    /// Job was cancelled by the user.
    JobCancelled {
        /// Job identifier.
        id: JobId,
    },
}

impl JobEvent {
    /// Create a job started event.
    pub fn started(id: JobId, name: impl Into<String>, file_count: usize, total_bytes: u64) -> Self {
        Self::JobStarted {
            id,
            name: name.into(),
            file_count,
            total_bytes,
        }
    }

    /// Create a paused event.
    #[must_use]
    pub const fn paused(id: JobId) -> Self {
        Self::JobPaused { id }
    }

    /// Create a resumed event.
    #[must_use]
    pub const fn resumed(id: JobId) -> Self {
        Self::JobResumed { id }
    }

    /// Create an extraction started event.
    #[must_use]
    pub const fn extraction_started(id: JobId, archive_count: usize) -> Self {
        Self::ExtractionStarted { id, archive_count }
    }

    /// Create a completed event.
    pub fn completed(id: JobId, extraction_error: Option<impl Into<String>>) -> Self {
        Self::JobCompleted {
            id,
            extraction_error: extraction_error.map(Into::into),
        }
    }

    /// Create an error event. The user-facing message is derived from
    /// the error itself.
    #[must_use]
    pub fn errored(id: JobId, error: DownloadError) -> Self {
        let message = error.user_message();
        Self::JobError { id, error, message }
    }

    /// Create a cancelled event.
    #[must_use]
    pub const fn cancelled(id: JobId) -> Self {
        Self::JobCancelled { id }
    }

}
