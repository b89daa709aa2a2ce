//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Hard ceiling on parallel transfers, regardless of configuration.
pub const MAX_PARALLEL_CAP: usize = 8;

/// Default number of parallel transfers per job.
pub const DEFAULT_PARALLEL: usize = 3;

/// Configuration for the download engine.
///
/// Contains the paths, limits, and cadences the engine needs. Everything
/// has a sensible default except the download directory.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Root directory jobs download into. Each job gets a subdirectory
    /// named after its manifest.
    pub download_dir: PathBuf,
    /// Parallel transfers per job. Capped at [`MAX_PARALLEL_CAP`].
    pub max_parallel: usize,
    /// Extract split archives after all files complete.
    pub auto_extract: bool,
    /// Transfer tool binary. Resolved via `PATH` when not absolute.
    pub transfer_bin: PathBuf,
    /// Archive tool binary. Resolved via `PATH` when not absolute.
    pub extract_bin: PathBuf,
    /// Minimum interval between progress events.
    pub ui_throttle: Duration,
    /// Cadence of the reconciliation sweep.
    pub sweep_interval: Duration,
}

impl EngineConfig {
    /// Create a config with defaults for everything but the download root.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            max_parallel: DEFAULT_PARALLEL,
            auto_extract: true,
            transfer_bin: PathBuf::from("rclone"),
            extract_bin: PathBuf::from("7z"),
            ui_throttle: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(5),
        }
    }

    /// Set the parallel transfer limit. Values above the cap are clamped;
    /// zero becomes one.
    #[must_use]
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.clamp(1, MAX_PARALLEL_CAP);
        self
    }

    /// Enable or disable automatic archive extraction.
    #[must_use]
    pub const fn with_auto_extract(mut self, auto_extract: bool) -> Self {
        self.auto_extract = auto_extract;
        self
    }

    /// Set the transfer tool binary.
    #[must_use]
    pub fn with_transfer_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.transfer_bin = bin.into();
        self
    }

    /// Set the archive tool binary.
    #[must_use]
    pub fn with_extract_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.extract_bin = bin.into();
        self
    }

    /// Set the progress event throttle.
    #[must_use]
    pub const fn with_ui_throttle(mut self, throttle: Duration) -> Self {
        self.ui_throttle = throttle;
        self
    }

    /// Set the reconciliation sweep cadence.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new("/tmp/downloads");
        assert_eq!(config.max_parallel, DEFAULT_PARALLEL);
        assert!(config.auto_extract);
        assert_eq!(config.transfer_bin, PathBuf::from("rclone"));
        assert_eq!(config.extract_bin, PathBuf::from("7z"));
    }

    #[test]
    fn test_parallel_clamping() {
        assert_eq!(EngineConfig::new("/x").with_max_parallel(0).max_parallel, 1);
        assert_eq!(
            EngineConfig::new("/x").with_max_parallel(100).max_parallel,
            MAX_PARALLEL_CAP
        );
        assert_eq!(EngineConfig::new("/x").with_max_parallel(5).max_parallel, 5);
    }
}
