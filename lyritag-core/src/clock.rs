//! Playback position projection.
//!
//! The host only reports a position together with the time it was observed.
//! Everything between two host updates is extrapolated from that pair plus the
//! wall-clock time elapsed since.

use crate::time::round_centis;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Project the current offset in seconds, rounded to two decimals.
///
/// Returns `0.0` when either the position or its timestamp is unknown.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn project(
    position_seconds: Option<f64>,
    observed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let (Some(position), Some(observed_at)) = (position_seconds, observed_at) else {
        return 0.0;
    };
    let elapsed_ms = (now - observed_at).num_milliseconds();
    round_centis(position + elapsed_ms as f64 / 1000.0)
}

/// Last known `(position, observed_at)` pair for a running session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncAnchor {
    pub position_seconds: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl SyncAnchor {
    #[must_use]
    pub const fn new(position_seconds: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            position_seconds: Some(position_seconds),
            observed_at: Some(observed_at),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.position_seconds.is_some() && self.observed_at.is_some()
    }

    #[must_use]
    pub fn project(&self, now: DateTime<Utc>) -> f64 {
        project(self.position_seconds, self.observed_at, now)
    }

    /// Move `observed_at` forward by a measured pause so the paused interval
    /// does not count as playback.
    pub fn shift(&mut self, paused_for: Duration) {
        if let Some(observed_at) = self.observed_at {
            let delta = TimeDelta::from_std(paused_for).unwrap_or(TimeDelta::MAX);
            self.observed_at = Some(observed_at.checked_add_signed(delta).unwrap_or(observed_at));
        }
    }
}

/// Source of "now" for projections
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A wall clock that advances with tokio's clock.
///
/// Under a paused tokio runtime it only moves when virtual time does, which
/// keeps session timing deterministic in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: DateTime<Utc>,
    started: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }
}

impl WallClock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::MAX);
        self.origin.checked_add_signed(elapsed).unwrap_or(self.origin)
    }
}
