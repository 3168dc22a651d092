//! Half-open time windows in ledger milliseconds.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Milliseconds in one hour.
pub const MS_PER_HOUR: u64 = 3_600_000;

/// Longest reservation the program accepts, in hours.
pub const MAX_DURATION_HOURS: u64 = 24 * 30;

/// Current wall-clock time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Render a ledger timestamp for logs and responses.
#[must_use]
pub fn to_datetime(ms: u64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(i64::try_from(ms).ok()?).single()
}

/// Half-open interval `[start_ms, end_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start (ms since epoch).
    pub start_ms: u64,
    /// Exclusive end (ms since epoch).
    pub end_ms: u64,
}

impl TimeWindow {
    /// Create a window, rejecting empty or inverted intervals.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidWindow`] unless `start_ms < end_ms`.
    pub const fn new(start_ms: u64, end_ms: u64) -> Result<Self> {
        if start_ms >= end_ms {
            return Err(CoreError::InvalidWindow { start_ms, end_ms });
        }
        Ok(Self { start_ms, end_ms })
    }

    /// Window starting at `start_ms` lasting `hours` whole hours.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDuration`] for zero or excessive durations.
    pub fn from_hours(start_ms: u64, hours: u64) -> Result<Self> {
        validate_duration(hours)?;
        let end_ms = start_ms
            .checked_add(hours * MS_PER_HOUR)
            .ok_or(CoreError::InvalidDuration(hours))?;
        Self::new(start_ms, end_ms)
    }

    /// Length of the window in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }

    /// Length rounded up to whole hours (minimum one).
    #[must_use]
    pub const fn billable_hours(&self) -> u64 {
        let hours = self.duration_ms().div_ceil(MS_PER_HOUR);
        if hours == 0 { 1 } else { hours }
    }

    /// True if `instant_ms` lies inside the window.
    #[must_use]
    pub const fn contains(&self, instant_ms: u64) -> bool {
        self.start_ms <= instant_ms && instant_ms < self.end_ms
    }

    /// True if the two windows share at least one instant.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        overlaps(self.start_ms, self.end_ms, other.start_ms, other.end_ms)
    }
}

/// Overlap test for half-open intervals `[s1,e1)` and `[s2,e2)`.
///
/// Touching boundaries (`e1 == s2`) do not overlap.
#[must_use]
pub const fn overlaps(s1: u64, e1: u64, s2: u64, e2: u64) -> bool {
    s1 < e2 && s2 < e1
}

/// Check that a reservation duration is within the accepted range.
///
/// # Errors
///
/// Returns [`CoreError::InvalidDuration`] for zero or more than
/// [`MAX_DURATION_HOURS`].
pub const fn validate_duration(hours: u64) -> Result<()> {
    if hours == 0 || hours > MAX_DURATION_HOURS {
        return Err(CoreError::InvalidDuration(hours));
    }
    Ok(())
}
