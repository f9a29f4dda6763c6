/// Watermark-gated merge of freshly fetched samples into the store.
///
/// Every fetch returns an overlapping trailing window, so only samples
/// strictly newer than the stored watermark for (location, series) are
/// written. Values upstream omitted are filled according to an explicit
/// per-column `FallbackPolicy` before the write; nothing is ever
/// zero-filled.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{LocationId, Sample, SeriesKind};
use crate::store::{LastKnown, StoreError, TimeSeriesStore};

/// What to do with a missing value in one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Reuse the most recent known value for the column: first from the
    /// store, then from earlier samples in the same batch.
    CarryForward,
    /// Store the value as missing.
    LeaveMissing,
}

/// Per-column fallback policy applied to samples before they are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub temperature: Fallback,
    pub wind_speed: Fallback,
    pub rain: Fallback,
    pub snowfall: Fallback,
    pub weather_code: Fallback,
    pub wind_direction: Fallback,
    pub uv_index: Fallback,
}

impl Default for FallbackPolicy {
    /// Carries forward the continuous measurements; a weather code, wind
    /// direction or UV index is left missing rather than guessed.
    fn default() -> Self {
        Self {
            temperature: Fallback::CarryForward,
            wind_speed: Fallback::CarryForward,
            rain: Fallback::CarryForward,
            snowfall: Fallback::CarryForward,
            weather_code: Fallback::LeaveMissing,
            wind_direction: Fallback::LeaveMissing,
            uv_index: Fallback::LeaveMissing,
        }
    }
}

impl FallbackPolicy {
    /// Stores exactly what upstream sent.
    pub fn none() -> Self {
        Self {
            temperature: Fallback::LeaveMissing,
            wind_speed: Fallback::LeaveMissing,
            rain: Fallback::LeaveMissing,
            snowfall: Fallback::LeaveMissing,
            weather_code: Fallback::LeaveMissing,
            wind_direction: Fallback::LeaveMissing,
            uv_index: Fallback::LeaveMissing,
        }
    }

    fn any_carry_forward(&self) -> bool {
        [
            self.temperature,
            self.wind_speed,
            self.rain,
            self.snowfall,
            self.weather_code,
            self.wind_direction,
            self.uv_index,
        ]
        .contains(&Fallback::CarryForward)
    }
}

/// Fills `value` from `last` when the policy allows, then records the
/// effective value as the new last. Returns true if a fill happened.
fn fill<T: Copy>(fallback: Fallback, value: &mut Option<T>, last: &mut Option<T>) -> bool {
    let mut filled = false;
    if value.is_none() && fallback == Fallback::CarryForward && last.is_some() {
        *value = *last;
        filled = true;
    }
    if value.is_some() {
        *last = *value;
    }
    filled
}

/// Outcome of merging one series for one location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Samples in the fetched window.
    pub fetched: usize,
    /// Samples strictly newer than the watermark.
    pub fresh: usize,
    /// Rows inserted or changed by the upsert.
    pub written: usize,
    /// Individual values filled by the fallback policy.
    pub backfilled: usize,
    pub watermark_before: Option<DateTime<Utc>>,
    pub watermark_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct Merger {
    policy: FallbackPolicy,
}

impl Merger {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    /// Samples strictly newer than `watermark`; everything if there is none.
    ///
    /// `samples` must be in ascending timestamp order.
    pub fn gate<'a>(&self, samples: &'a [Sample], watermark: Option<DateTime<Utc>>) -> &'a [Sample] {
        match watermark {
            None => samples,
            Some(mark) => {
                let first_new = samples.partition_point(|s| s.timestamp <= mark);
                &samples[first_new..]
            }
        }
    }

    /// Applies the fallback policy in timestamp order, seeded from `last`.
    /// Returns the number of values filled.
    pub fn apply_fallback(&self, samples: &mut [Sample], mut last: LastKnown) -> usize {
        let p = &self.policy;
        let mut filled = 0;
        for s in samples.iter_mut() {
            filled += usize::from(fill(p.temperature, &mut s.temperature, &mut last.temperature));
            filled += usize::from(fill(p.wind_speed, &mut s.wind_speed, &mut last.wind_speed));
            filled += usize::from(fill(p.rain, &mut s.rain, &mut last.rain));
            filled += usize::from(fill(p.snowfall, &mut s.snowfall, &mut last.snowfall));
            filled += usize::from(fill(p.weather_code, &mut s.weather_code, &mut last.weather_code));
            filled += usize::from(fill(p.wind_direction, &mut s.wind_direction, &mut last.wind_direction));
            filled += usize::from(fill(p.uv_index, &mut s.uv_index, &mut last.uv_index));
        }
        filled
    }

    /// Gates `samples` against the stored watermark, backfills and upserts
    /// the fresh tail.
    pub fn merge<S: TimeSeriesStore + ?Sized>(
        &self,
        store: &mut S,
        location: LocationId,
        series: SeriesKind,
        samples: &[Sample],
    ) -> Result<MergeOutcome, StoreError> {
        let watermark_before = store.watermark(location, series)?;
        let fresh = self.gate(samples, watermark_before);

        let mut outcome = MergeOutcome {
            fetched: samples.len(),
            fresh: fresh.len(),
            watermark_before,
            watermark_after: watermark_before,
            ..MergeOutcome::default()
        };

        if fresh.is_empty() {
            debug!(location, series = %series, fetched = samples.len(), "nothing newer than watermark");
            return Ok(outcome);
        }

        let mut rows = fresh.to_vec();
        if self.policy.any_carry_forward() {
            let last = store.last_known(location, series)?;
            outcome.backfilled = self.apply_fallback(&mut rows, last);
        }

        outcome.written = store.upsert(location, series, &rows)?;
        outcome.watermark_after = store.watermark(location, series)?;

        debug!(
            location,
            series = %series,
            fetched = outcome.fetched,
            fresh = outcome.fresh,
            written = outcome.written,
            backfilled = outcome.backfilled,
            "merged"
        );
        Ok(outcome)
    }
}
