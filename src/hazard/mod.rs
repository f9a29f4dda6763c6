/// Hazard detection over a fetched window.
///
/// - `classify`  — per-sample flags for wind, temperature and precipitation.
/// - `intervals` — run-length grouping of flagged samples into intervals.
///
/// Only samples inside the alert `Horizon` are scanned; anything earlier
/// belongs to history that previous cycles already alerted on.

pub mod classify;
pub mod intervals;

use chrono::{DateTime, Duration, Utc};

pub use classify::{Classification, HazardClassifier};
pub use intervals::{aggregate, find_intervals, Interval, ScanTarget};

/// Closed time window `[from, until]` eligible for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Horizon {
    /// `[now, now + length]`, saturating at the latest representable instant.
    pub fn starting_at(now: DateTime<Utc>, length: Duration) -> Self {
        Self {
            from: now,
            until: now.checked_add_signed(length).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.from <= t && t <= self.until
    }
}
