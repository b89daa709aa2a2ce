//! Untrusted path validation.
//!
//! Every file name coming out of a manifest and every entry path listed
//! inside an archive passes through here before anything touches disk.
//! Rejection is a fatal job error, never a retryable one.

use std::path::{Path, PathBuf};

use crate::download::DownloadError;

/// Validate and normalize an untrusted relative path.
///
/// Accepts either separator style. A drive prefix (`C:`) or a leading
/// separator marks the path as anchored and is stripped rather than
/// rejected; the manifest author meant a path relative to the download
/// root. Empty input maps to the empty string (a root entry).
///
/// Rejected outright:
/// - embedded NUL bytes
/// - any `..` segment, anywhere
///
/// The result uses `/` separators, carries no empty or `.` segments, and
/// is a fixed point: `sanitize_rel_path(sanitize_rel_path(x)) == sanitize_rel_path(x)`
/// for any accepted `x`.
pub fn sanitize_rel_path(raw: &str) -> Result<String, DownloadError> {
    if raw.contains('\0') {
        return Err(DownloadError::path_traversal(raw.replace('\0', "\\0")));
    }

    let mut s = raw.replace('\\', "/");

    // Strip a drive prefix like "C:" before looking at separators.
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        s.drain(..2);
    }

    let mut segments = Vec::new();
    for segment in s.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(DownloadError::path_traversal(raw)),
            other => segments.push(other),
        }
    }

    Ok(segments.join("/"))
}

/// Join a sanitized relative path to a base directory, rejecting anything
/// that escapes it.
///
/// The base directory must exist. The relative path is sanitized again
/// (the call is idempotent, so double-sanitizing is harmless), joined,
/// and then the deepest existing ancestor of the result is canonicalized
/// and checked against the canonical base. This catches symlink and
/// normalization bypasses that a purely lexical check would miss.
pub fn resolve_inside(base: &Path, rel: &str) -> Result<PathBuf, DownloadError> {
    let rel = sanitize_rel_path(rel)?;
    let canonical_base = base
        .canonicalize()
        .map_err(|e| DownloadError::from_io_error(&e))?;

    let joined = canonical_base.join(&rel);

    // Walk up until we find a path that exists on disk.
    let mut existing = joined.clone();
    let mut missing_tail: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing_tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let canonical_existing = existing
        .canonicalize()
        .map_err(|e| DownloadError::from_io_error(&e))?;

    if canonical_existing != canonical_base && !canonical_existing.starts_with(&canonical_base) {
        return Err(DownloadError::path_traversal(rel));
    }

    let mut resolved = canonical_existing;
    for component in missing_tail.into_iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}
