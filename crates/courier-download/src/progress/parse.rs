//! Transfer-tool output parsing.
//!
//! The transfer tool streams human-oriented progress text on its standard
//! streams. The lines we care about look like:
//!
//! ```text
//! Transferred:   10.5 MiB / 100 MiB, 10%, 5 MiB/s, ETA 18s
//! ```
//!
//! Other log lines occasionally contain percent signs or byte counts
//! (e.g. file names, HTTP diagnostics), so a stats line is preferred over
//! a bare regex hit on arbitrary output.

use std::sync::LazyLock;

use regex::Regex;

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)%").unwrap_or_else(|_| unreachable!()));

static SPEED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+\.?\d*\s*[KMG]?i?B/s)").unwrap_or_else(|_| unreachable!())
});

static ETA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ETA\s+(\S+)").unwrap_or_else(|_| unreachable!()));

/// Fields extracted from one line of transfer-tool output. Absent fields
/// mean the line carried no usable value, not that the value reset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineProgress {
    /// Percent complete (0.0 - 100.0), clamped.
    pub percent: Option<f64>,
    /// Speed exactly as printed (e.g. "5 MiB/s").
    pub speed: Option<String>,
    /// Speed normalized to bytes per second.
    pub speed_bps: Option<f64>,
    /// ETA token exactly as printed (e.g. "18s").
    pub eta: Option<String>,
    /// True when the line was an aggregate stats line rather than an
    /// incidental match.
    pub from_stats: bool,
}

impl LineProgress {
    /// True when nothing was extracted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.percent.is_none() && self.speed.is_none() && self.eta.is_none()
    }
}

/// Parse one line of transfer-tool output.
///
/// Returns `None` when the line carries no progress information at all.
#[must_use]
pub fn parse_line(line: &str) -> Option<LineProgress> {
    let from_stats = line.contains("Transferred:");

    let percent = PERCENT_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|p| p.clamp(0.0, 100.0));

    let speed = SPEED_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let speed_bps = speed.as_deref().and_then(parse_speed);

    let eta = ETA_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let parsed = LineProgress {
        percent,
        speed,
        speed_bps,
        eta,
        from_stats,
    };

    if parsed.is_empty() { None } else { Some(parsed) }
}

/// Parse a size token like "10.5 MiB" or "100B" into bytes.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let (num_str, unit) = if let Some(n) = s.strip_suffix("GiB") {
        (n, 1024u64 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MiB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("KiB") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1)
    } else {
        return None;
    };

    let num: f64 = num_str.trim().parse().ok()?;
    if num < 0.0 {
        return None;
    }
    Some((num * unit as f64) as u64)
}

/// Normalize a speed token like "5 MiB/s" to bytes per second.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn parse_speed(s: &str) -> Option<f64> {
    let s = s.trim().strip_suffix("/s")?;
    parse_size(s).map(|b| b as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_line() {
        let p = parse_line("Transferred:   10.5 MiB / 100 MiB, 10%, 5 MiB/s, ETA 18s").unwrap();
        assert!(p.from_stats);
        assert_eq!(p.percent, Some(10.0));
        assert_eq!(p.speed.as_deref(), Some("5 MiB/s"));
        assert_eq!(p.speed_bps, Some(5.0 * 1024.0 * 1024.0));
        assert_eq!(p.eta.as_deref(), Some("18s"));
    }

    #[test]
    fn test_percent_only_line_is_not_stats() {
        let p = parse_line(" * my-file.bin: 42% /1.2 GiB").unwrap();
        assert!(!p.from_stats);
        assert_eq!(p.percent, Some(42.0));
    }

    #[test]
    fn test_plain_log_line_yields_nothing() {
        assert!(parse_line("2024/01/01 INFO  : waiting for checks to finish").is_none());
    }

    #[test]
    fn test_percent_clamped() {
        let p = parse_line("Transferred: x, 250%, done").unwrap();
        assert_eq!(p.percent, Some(100.0));
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("100B"), Some(100));
        assert_eq!(parse_size("1KiB"), Some(1024));
        assert_eq!(parse_size("10.5 MiB"), Some((10.5 * 1024.0 * 1024.0) as u64));
        assert_eq!(parse_size("2GiB"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("oops"), None);
    }

    #[test]
    fn test_parse_speed() {
        assert_eq!(parse_speed("5 MiB/s"), Some(5.0 * 1024.0 * 1024.0));
        assert_eq!(parse_speed("512KiB/s"), Some(512.0 * 1024.0));
        assert_eq!(parse_speed("fast"), None);
    }
}
