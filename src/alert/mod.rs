/// Alert recording: one persisted alert per (location, hazard kind, start).
///
/// Each hazard interval found in a cycle becomes an `AlertRecord` with a
/// rendered message and a provenance relative to the processing clock. The
/// store's insert is the deduplication point; a repeat submission of the
/// same key writes nothing and is counted as suppressed.
///
/// After a successful insert the record is pushed onto the notification
/// outbox. The write is already committed by then, so a slow, failing or
/// absent notifier cannot affect what was persisted.

use chrono::{DateTime, Duration, Utc};
use std::sync::mpsc::Sender;
use tracing::{info, warn};

use crate::model::{AlertRecord, HazardInterval, HazardKind, Provenance};
use crate::store::{AlertStore, StoreError};

/// Counts from recording one batch of intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub recorded: usize,
    pub suppressed: usize,
}

impl RecordOutcome {
    pub fn add(&mut self, other: RecordOutcome) {
        self.recorded += other.recorded;
        self.suppressed += other.suppressed;
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertRecorder {
    outbox: Option<Sender<AlertRecord>>,
}

impl AlertRecorder {
    /// A recorder that only persists.
    pub fn new() -> Self {
        Self { outbox: None }
    }

    /// A recorder that also emits each newly persisted alert on `outbox`.
    pub fn with_outbox(outbox: Sender<AlertRecord>) -> Self {
        Self { outbox: Some(outbox) }
    }

    /// Persists every interval, returning how many were new.
    ///
    /// Stops at the first store error; alerts written before it stay
    /// written and will be suppressed as duplicates on the next cycle.
    pub fn record<S: AlertStore + ?Sized>(
        &self,
        store: &mut S,
        intervals: &[HazardInterval],
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, StoreError> {
        let mut outcome = RecordOutcome::default();

        for interval in intervals {
            let alert = build_record(interval, now);

            if store.insert_alert(&alert)? {
                outcome.recorded += 1;
                info!(
                    location = %alert.location,
                    hazard = %alert.kind,
                    series = %alert.series,
                    start = %alert.start,
                    provenance = %alert.provenance,
                    "{}",
                    alert.message
                );
                self.emit(alert);
            } else {
                outcome.suppressed += 1;
                info!(
                    location = %alert.location,
                    hazard = %alert.kind,
                    series = %alert.series,
                    start = %alert.start,
                    "alert already recorded, suppressed"
                );
            }
        }

        Ok(outcome)
    }

    fn emit(&self, alert: AlertRecord) {
        let Some(outbox) = &self.outbox else {
            return;
        };
        if let Err(e) = outbox.send(alert) {
            warn!(
                location = %e.0.location,
                hazard = %e.0.kind,
                start = %e.0.start,
                "notifier is gone, alert not forwarded"
            );
        }
    }
}

/// Builds the persisted form of `interval` as seen at `now`.
pub fn build_record(interval: &HazardInterval, now: DateTime<Utc>) -> AlertRecord {
    AlertRecord {
        location_id: interval.location_id,
        location: interval.location.clone(),
        kind: interval.kind,
        series: interval.series,
        start: interval.start,
        length: interval.length,
        magnitude: interval.magnitude,
        message: render_message(interval),
        provenance: Provenance::classify(Some(interval.start), now),
    }
}

/// Human-readable summary, e.g.
/// `Zugspitze: wind 61.0 km/h from 14:00 UTC for 3h`.
pub fn render_message(interval: &HazardInterval) -> String {
    let what = match interval.kind {
        HazardKind::Wind => format!("wind {:.1} km/h", interval.magnitude),
        HazardKind::Temperature => format!("temperature {:.1} °C", interval.magnitude),
        HazardKind::Precipitation if interval.magnitude > 0.0 => {
            format!("precipitation {:.1} mm", interval.magnitude)
        }
        HazardKind::Precipitation => "precipitation reported".to_string(),
    };

    format!(
        "{}: {} from {} UTC for {}",
        interval.location,
        what,
        interval.start.format("%H:%M"),
        format_duration(interval.duration())
    )
}

fn format_duration(d: Duration) -> String {
    let hours = d.num_hours();
    let minutes = d.num_minutes() - hours * 60;
    match (hours, minutes) {
        (0, m) => format!("{m}min"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}min"),
    }
}
