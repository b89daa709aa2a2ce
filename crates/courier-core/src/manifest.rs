//! Manifest parsing and normalization.
//!
//! A manifest arrives as JSON in one of three shapes:
//!
//! - standard: `{ "files": [...], "name": "...", "totalSize": 123 }`
//! - single file: `{ "url": "...", "name": "...", "size": 123 }`
//! - bare array: `[ { "url": "...", "name": "...", "size": 123 }, ... ]`
//!
//! All three normalize into [`Manifest`]. File names are sanitized during
//! normalization, so a `Manifest` never carries an unsafe path.

use serde::{Deserialize, Serialize};

use crate::download::{DownloadError, DownloadResult, FileEntry};
use crate::sanitize::sanitize_rel_path;

/// Raw file entry as it appears on the wire, before sanitization.
#[derive(Clone, Debug, Deserialize)]
struct RawFile {
    url: String,
    name: String,
    #[serde(default)]
    size: u64,
}

/// The three accepted wire shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawManifest {
    Standard {
        files: Vec<RawFile>,
        #[serde(default)]
        name: Option<String>,
        #[serde(rename = "totalSize", default)]
        total_size: u64,
    },
    Single {
        url: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        size: u64,
    },
    List(Vec<RawFile>),
}

/// A normalized, validated download manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Display name; also the directory the job downloads into.
    pub name: String,
    /// Files to retrieve, names already sanitized.
    pub files: Vec<FileEntry>,
    /// Total bytes expected. Zero means at least one size was unknown
    /// and no explicit total was given.
    pub total_bytes: u64,
}

impl Manifest {
    /// Parse a manifest from raw JSON and normalize it.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidManifest`] for malformed JSON, an
    /// empty file list, or a non-HTTP URL; [`DownloadError::PathTraversal`]
    /// when any file name is unsafe.
    pub fn from_json(raw: &str) -> DownloadResult<Self> {
        let parsed: RawManifest = serde_json::from_str(raw).map_err(|e| {
            DownloadError::invalid_manifest(format!(
                "expected a files array or a url property: {e}"
            ))
        })?;
        Self::from_raw(parsed)
    }

    /// Parse a manifest from an already-deserialized JSON value.
    pub fn from_value(value: serde_json::Value) -> DownloadResult<Self> {
        let parsed: RawManifest = serde_json::from_value(value).map_err(|e| {
            DownloadError::invalid_manifest(format!(
                "expected a files array or a url property: {e}"
            ))
        })?;
        Self::from_raw(parsed)
    }

    fn from_raw(raw: RawManifest) -> DownloadResult<Self> {
        let (raw_files, name, explicit_total) = match raw {
            RawManifest::Standard {
                files,
                name,
                total_size,
            } => (files, name.unwrap_or_else(|| "Unknown".to_string()), total_size),
            RawManifest::Single { url, name, size } => {
                let name = name.unwrap_or_else(|| "download".to_string());
                let files = vec![RawFile {
                    url,
                    name: name.clone(),
                    size,
                }];
                (files, name, size)
            }
            RawManifest::List(files) => {
                let name = files
                    .first()
                    .map_or_else(|| "download".to_string(), |f| f.name.clone());
                (files, name, 0)
            }
        };

        if raw_files.is_empty() {
            return Err(DownloadError::invalid_manifest("manifest has no files"));
        }

        let mut files = Vec::with_capacity(raw_files.len());
        for raw in raw_files {
            if !raw.url.starts_with("http://") && !raw.url.starts_with("https://") {
                return Err(DownloadError::unsupported_transport(raw.url));
            }
            let sanitized = sanitize_rel_path(&raw.name)?;
            if sanitized.is_empty() {
                return Err(DownloadError::invalid_manifest(format!(
                    "file name '{}' resolves to nothing",
                    raw.name
                )));
            }
            files.push(FileEntry {
                url: raw.url,
                name: sanitized,
                size: raw.size,
            });
        }

        // Sanitize the job name too; it becomes a directory component.
        let name = sanitize_rel_path(&name)?;
        let name = if name.is_empty() {
            "download".to_string()
        } else {
            name
        };

        let total_bytes = if explicit_total > 0 {
            explicit_total
        } else if files.iter().all(|f| f.size > 0) {
            files.iter().map(|f| f.size).sum()
        } else {
            0
        };

        Ok(Self {
            name,
            files,
            total_bytes,
        })
    }
}
