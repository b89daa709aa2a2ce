//! Failure classification for transfer-tool output.
//!
//! Runs only on failure (non-zero exit or spawn error); success exits
//! never invoke it. The mapping is textual because the transfer tool
//! reports remote-side failures as diagnostic text, not structured codes.

use courier_core::DownloadError;

/// Phrases that identify an upstream download quota on their own.
const QUOTA_STRONG: &[&str] = &[
    "too many users have viewed or downloaded this file",
    "download quota for this file has been exceeded",
    "downloadquotaexceeded",
];

/// Phrases that suggest a quota but also appear in unrelated errors.
/// These only count alongside provider or HTTP-status evidence.
const QUOTA_WEAK: &[&str] = &["rate limit exceeded", "user rate limit"];

/// Evidence that the failure came from the storage provider rather than
/// some intermediate hop.
const PROVIDER_EVIDENCE: &[&str] = &["googleapi", "drive.google.com", "error 403", "error 429"];

/// Capacity phrases from the orchestration's own backend.
const SERVER_BUSY: &[&str] = &[
    "server is busy",
    "too many concurrent downloads",
    "all download slots are in use",
];

/// Auth-failure phrases from the remote provider.
const TOKEN_EXPIRED: &[&str] = &[
    "token has expired",
    "token expired",
    "invalid_grant",
    "401 unauthorized",
];

/// Classify accumulated transfer-tool output into a failure category.
///
/// A quota is reported either on a strong, unambiguous phrase or on a
/// weak phrase co-occurring with provider evidence or an HTTP 403/429
/// token. A bare weak phrase stays generic: "rate limit exceeded" shows
/// up in errors that have nothing to do with download quotas.
#[must_use]
pub fn classify(output: &str, exit_code: i32) -> DownloadError {
    let text = output.to_lowercase();

    let strong_quota = QUOTA_STRONG.iter().any(|p| text.contains(p));
    let weak_quota = QUOTA_WEAK.iter().any(|p| text.contains(p));
    let provider = PROVIDER_EVIDENCE.iter().any(|p| text.contains(p))
        || has_status_token(&text, "403")
        || has_status_token(&text, "429");

    if strong_quota || (weak_quota && provider) {
        return DownloadError::QuotaExceeded;
    }

    if SERVER_BUSY.iter().any(|p| text.contains(p)) {
        return DownloadError::server_busy(last_line(output));
    }

    if TOKEN_EXPIRED.iter().any(|p| text.contains(p)) {
        return DownloadError::TokenExpired;
    }

    DownloadError::transfer(exit_code, last_line(output))
}

/// Match an HTTP status as its own token, not as part of a larger number.
fn has_status_token(text: &str, status: &str) -> bool {
    text.split(|c: char| !c.is_ascii_digit())
        .any(|tok| tok == status)
}

/// Last non-empty line of output, for human display.
fn last_line(output: &str) -> String {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("transfer tool reported no output")
        .to_string()
}
