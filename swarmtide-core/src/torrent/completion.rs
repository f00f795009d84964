//! Whole-session throughput report emitted when the download finishes.

use std::fmt;
use std::time::Duration;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Final statistics for a finished download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionReport {
    /// Total file size in bytes
    pub total_size: u64,
    /// Wall time from engine start to completion
    pub elapsed: Duration,
    /// Average speed in bytes per second over the whole session
    pub average_speed: f64,
}

impl CompletionReport {
    /// Computes the session average `total_size / elapsed`.
    ///
    /// A zero elapsed time is clamped to one nanosecond so the speed stays
    /// finite.
    pub fn new(total_size: u64, elapsed: Duration) -> Self {
        let seconds = elapsed.max(Duration::from_nanos(1)).as_secs_f64();
        Self {
            total_size,
            elapsed,
            average_speed: total_size as f64 / seconds,
        }
    }
}

impl fmt::Display for CompletionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {:.2}s, average {}/s",
            format_size(self.total_size as f64),
            self.elapsed.as_secs_f64(),
            format_size(self.average_speed)
        )
    }
}

/// Formats a byte quantity with 1024-based units and two decimals.
pub fn format_size(bytes: f64) -> String {
    let mut size = bytes;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2}{}", SIZE_UNITS[unit])
}
