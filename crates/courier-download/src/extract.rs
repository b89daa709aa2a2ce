//! Split-archive discovery and extraction.
//!
//! After a job's files are all on disk, the destination tree is scanned
//! for archives. The first volume of a split set and a standalone
//! archive are equivalent discovery units; later volumes are skipped so
//! a split set is extracted once. Every entry path inside an archive is
//! validated against the destination directory before the extractor
//! runs (zip-slip defense).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use courier_core::{DownloadError, DownloadResult, resolve_inside};

/// Archive extractor backed by an external tool with 7-Zip-style
/// `l -slt` listing and `x` extraction commands.
pub struct Extractor {
    bin: PathBuf,
}

impl Extractor {
    #[must_use]
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    /// Scan a directory tree for extractable archives.
    ///
    /// Returns standalone archives and first volumes of split sets,
    /// never later volumes.
    #[must_use]
    pub fn discover(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&current) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if is_discovery_unit(&path) {
                    found.push(path);
                }
            }
        }
        found.sort();
        found
    }

    /// Extract every discovered archive in `dir`, sequentially.
    ///
    /// Stops at the first failure. The caller records the error against
    /// the otherwise-completed job; it never reopens the download state.
    pub async fn extract_all(&self, dir: &Path) -> DownloadResult<()> {
        for archive in Self::discover(dir) {
            self.verify_entries(&archive, dir).await?;
            self.extract_one(&archive, dir).await?;
        }
        Ok(())
    }

    /// List the archive's entries and validate each path against the
    /// destination directory. One bad entry aborts the whole archive.
    async fn verify_entries(&self, archive: &Path, dest: &Path) -> DownloadResult<()> {
        let entries = self.list_entries(archive).await?;
        verify_entry_paths(dest, &entries).map_err(|e| {
            DownloadError::extraction(format!("archive {}: {e}", archive.display()))
        })
    }

    /// Run the tool's machine-parseable listing and collect entry paths.
    async fn list_entries(&self, archive: &Path) -> DownloadResult<Vec<String>> {
        let output = Command::new(&self.bin)
            .arg("l")
            .arg("-slt")
            .arg("-ba")
            .arg(archive)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DownloadError::extraction(format!("failed to run archive tool: {e}")))?;

        if !output.status.success() {
            return Err(DownloadError::extraction(format!(
                "listing {} failed with exit code {}",
                archive.display(),
                output.status.code().unwrap_or(-1)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_listing(&stdout))
    }

    async fn extract_one(&self, archive: &Path, dest: &Path) -> DownloadResult<()> {
        tracing::info!(archive = %archive.display(), "extracting archive");

        let mut out_flag = std::ffi::OsString::from("-o");
        out_flag.push(dest);

        let output = Command::new(&self.bin)
            .arg("x")
            .arg(archive)
            .arg(out_flag)
            .arg("-y")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DownloadError::extraction(format!("failed to run archive tool: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::extraction(format!(
                "extracting {} failed (exit {}): {}",
                archive.display(),
                output.status.code().unwrap_or(-1),
                stderr.lines().last().unwrap_or("no output").trim()
            )));
        }
        Ok(())
    }
}

/// Reject extraction when any entry path would land outside `dest`.
fn verify_entry_paths(dest: &Path, entries: &[String]) -> DownloadResult<()> {
    for entry in entries {
        resolve_inside(dest, entry)
            .map_err(|_| DownloadError::extraction(format!("unsafe entry path '{entry}'")))?;
    }
    Ok(())
}

/// Pull `Path = ...` values out of `-slt` listing output.
fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix("Path = "))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// True for standalone archives and first split volumes only.
fn is_discovery_unit(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_lowercase();

    // Numeric split volumes: only .001 counts; .002+ belong to a set
    // that .001 already represents.
    if let Some((_, suffix)) = lower.rsplit_once('.') {
        if suffix.len() == 3 && suffix.chars().all(|c| c.is_ascii_digit()) {
            return suffix == "001";
        }
    }

    // rar-style volumes: .part1.rar leads the set.
    if lower.ends_with(".rar") {
        if let Some(idx) = lower.rfind(".part") {
            let middle = &lower[idx + 5..lower.len() - 4];
            if !middle.is_empty() && middle.chars().all(|c| c.is_ascii_digit()) {
                return middle.trim_start_matches('0') == "1";
            }
        }
        return true;
    }

    lower.ends_with(".7z") || lower.ends_with(".zip")
}
