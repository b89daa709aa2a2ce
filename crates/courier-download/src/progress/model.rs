//! Aggregate progress arithmetic.
//!
//! Two update paths feed one derived value: completed files add their
//! full size to the job's byte counter, and active files contribute an
//! estimated `size * percent / 100`. The derived percent is recomputed
//! on every broadcast, never stored as authoritative state.

/// Inputs to one aggregate recompute.
#[derive(Clone, Debug)]
pub struct AggregateInput<'a> {
    /// Bytes confirmed written by fully-completed files.
    pub downloaded_bytes: u64,
    /// Total bytes expected; zero when unknown.
    pub total_bytes: u64,
    /// `(expected size, percent)` for each file currently transferring.
    pub active: &'a [(u64, f64)],
    /// Files fully on disk.
    pub completed_files: usize,
    /// Files in the manifest.
    pub file_count: usize,
    /// True when the job is eligible to finalize right now. While false,
    /// the derived percent is held at 99 even if the arithmetic says 100.
    pub finalize_ready: bool,
}

/// One recomputed aggregate view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregateView {
    /// Bytes on disk plus estimated in-flight bytes, capped at the total.
    pub bytes: u64,
    /// Derived percent (0 - 100).
    pub percent: u8,
}

/// Recompute the aggregate view from scratch.
///
/// With a known total, progress is byte-weighted; without one, it falls
/// back to a per-file percent average so many-file jobs still move.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn recompute(input: &AggregateInput<'_>) -> AggregateView {
    let in_flight: f64 = input
        .active
        .iter()
        .filter(|(_, percent)| *percent > 0.0 && *percent < 100.0)
        .map(|(size, percent)| *size as f64 * percent / 100.0)
        .sum();

    let mut bytes = input.downloaded_bytes + in_flight as u64;
    if input.total_bytes > 0 {
        bytes = bytes.min(input.total_bytes);
    }

    let raw_percent = if input.total_bytes > 0 {
        (bytes as f64 / input.total_bytes as f64 * 100.0).round()
    } else if input.file_count > 0 {
        let active_sum: f64 = input.active.iter().map(|(_, p)| p).sum();
        ((input.completed_files as f64).mul_add(100.0, active_sum) / input.file_count as f64)
            .round()
    } else {
        0.0
    };

    let mut percent = raw_percent.clamp(0.0, 100.0) as u8;
    if percent >= 100 && !input.finalize_ready {
        // Never show 100% while files are outstanding or errored.
        percent = 99;
    }

    AggregateView { bytes, percent }
}
