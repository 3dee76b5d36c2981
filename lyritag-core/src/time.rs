//! Time and duration conversion utilities.
//!
//! Playback positions arrive from the host as floating point seconds while the
//! lyrics timeline is kept in integer milliseconds. The helpers here make the
//! conversions explicit and saturating so a bogus position can never panic.

use std::time::Duration;

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Convert duration to milliseconds as u64, saturating at `u64::MAX`.
    fn as_millis_u64(&self) -> u64;

    /// Format the duration as `M:SS`, the way play offsets are shown to users.
    fn as_play_time(&self) -> String;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }

    fn as_play_time(&self) -> String {
        let secs = self.as_secs();
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

/// Convert a position in seconds to whole milliseconds.
///
/// Negative, NaN and infinite inputs map to zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn secs_to_millis(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    // f64 -> u64 `as` casts saturate, so oversized positions clamp to u64::MAX
    (secs * 1000.0).round() as u64
}

/// Round a position in seconds to two decimals.
#[must_use]
pub fn round_centis(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
