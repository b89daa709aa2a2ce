//! Download error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. For I/O errors, we capture the kind
//! and message as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for download and extraction operations.
///
/// Designed to be serializable across process boundaries (frontend events,
/// history records, CLI output) without depending on non-serializable
/// types like `std::io::Error`.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DownloadError {
    /// A manifest or archive entry path escapes the download directory.
    #[error("Unsafe path rejected: {path}")]
    PathTraversal {
        /// The offending path, as received.
        path: String,
    },

    /// Manifest could not be parsed or carries no usable files.
    #[error("Invalid manifest: {message}")]
    InvalidManifest {
        /// Detailed error message.
        message: String,
    },

    /// The file URL uses a scheme the transfer tool does not handle.
    #[error("Unsupported transport: {url}")]
    UnsupportedTransport {
        /// The offending URL.
        url: String,
    },

    /// Remote provider refused the transfer due to a download quota.
    #[error("Download quota exceeded")]
    QuotaExceeded,

    /// Remote server is temporarily overloaded.
    #[error("Server busy: {message}")]
    ServerBusy {
        /// Detailed error message.
        message: String,
    },

    /// Access token rejected by the remote provider.
    #[error("Access token expired")]
    TokenExpired,

    /// Transfer tool exited unsuccessfully for an unclassified reason.
    #[error("Transfer failed (exit {exit_code}): {message}")]
    Transfer {
        /// Exit code reported by the transfer tool.
        exit_code: i32,
        /// Last meaningful line of tool output.
        message: String,
    },

    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "NotFound", "PermissionDenied").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Archive extraction failed after all files downloaded.
    #[error("Extraction failed: {message}")]
    Extraction {
        /// Detailed error message.
        message: String,
    },

    /// Job not found in the active registry.
    #[error("No active job: {id}")]
    JobNotFound {
        /// The job ID that wasn't found.
        id: String,
    },

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl DownloadError {
    /// Create a path traversal error.
    pub fn path_traversal(path: impl Into<String>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Create an invalid manifest error.
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            message: message.into(),
        }
    }

    /// Create an unsupported transport error.
    pub fn unsupported_transport(url: impl Into<String>) -> Self {
        Self::UnsupportedTransport { url: url.into() }
    }

    /// Create a server busy error.
    pub fn server_busy(message: impl Into<String>) -> Self {
        Self::ServerBusy {
            message: message.into(),
        }
    }

    /// Create a transfer tool failure.
    pub fn transfer(exit_code: i32, message: impl Into<String>) -> Self {
        Self::Transfer {
            exit_code,
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    ///
    /// This captures the error kind name and message for serialization.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create an extraction error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Create a job not found error.
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::JobNotFound { id: id.into() }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if this error is worth retrying.
    ///
    /// Quota and token errors need user action (wait, re-authenticate);
    /// path and manifest errors will fail identically on every attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServerBusy { .. } | Self::Transfer { .. } | Self::Io { .. } | Self::Other { .. }
        )
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::PathTraversal { path } => {
                format!("Refused to write outside the download folder: '{path}'")
            }
            Self::InvalidManifest { message } => format!("Could not read download list: {message}"),
            Self::UnsupportedTransport { url } => {
                format!("This link type is not supported: {url}")
            }
            Self::QuotaExceeded => {
                "The host's download quota for this file has been reached. \
                 Try again later (quotas usually reset within 24 hours)."
                    .to_string()
            }
            Self::ServerBusy { .. } => {
                "The server is busy right now. Wait a moment and retry.".to_string()
            }
            Self::TokenExpired => {
                "Your access token has expired. Sign in again and retry.".to_string()
            }
            Self::Transfer { exit_code, message } => {
                format!("Download failed (code {exit_code}): {message}")
            }
            Self::Io { message, .. } => format!("File operation failed: {message}"),
            Self::Extraction { message } => format!("Could not extract archive: {message}"),
            Self::JobNotFound { id } => format!("Download '{id}' is not active."),
            Self::Other { message } => message.clone(),
        }
    }
}

/// Convenience result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;
