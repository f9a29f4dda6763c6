/// Run-length grouping of flagged samples into hazard intervals.
///
/// A scan over samples in ascending timestamp order keeps at most one open
/// interval per hazard kind. A flagged sample opens or extends it; an
/// unflagged or missing sample closes it. The magnitude is fixed by the
/// first sample of the run.

use chrono::{DateTime, Utc};

use super::classify::HazardClassifier;
use super::Horizon;
use crate::model::{HazardInterval, HazardKind, LocationId, Sample, SeriesKind};

/// A closed run of consecutive flagged samples for one hazard kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub length: usize,
    pub magnitude: f64,
}

/// Groups `(timestamp, flag)` points into intervals, where `Some(m)` is a
/// flagged point with magnitude `m`.
///
/// Points must be in ascending timestamp order.
pub fn aggregate<I>(points: I) -> Vec<Interval>
where
    I: IntoIterator<Item = (DateTime<Utc>, Option<f64>)>,
{
    let mut closed = Vec::new();
    let mut open: Option<Interval> = None;

    for (timestamp, flag) in points {
        match flag {
            Some(magnitude) => {
                if let Some(run) = open.as_mut() {
                    run.length += 1;
                } else {
                    open = Some(Interval {
                        start: timestamp,
                        length: 1,
                        magnitude,
                    });
                }
            }
            None => closed.extend(open.take()),
        }
    }
    closed.extend(open);
    closed
}

/// Which slice of a fetched window one location's pipeline is scanning.
#[derive(Debug, Clone, Copy)]
pub struct ScanTarget<'a> {
    pub location_id: LocationId,
    pub location: &'a str,
    pub series: SeriesKind,
}

/// Classifies every in-horizon sample and aggregates each hazard kind.
///
/// Intervals are returned grouped by kind (wind, temperature,
/// precipitation), each group in start order.
pub fn find_intervals(
    classifier: &HazardClassifier,
    samples: &[Sample],
    horizon: &Horizon,
    target: ScanTarget<'_>,
) -> Vec<HazardInterval> {
    debug_assert!(
        samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
        "samples must be strictly ascending"
    );

    let flagged: Vec<_> = samples
        .iter()
        .filter(|s| horizon.contains(s.timestamp))
        .map(|s| (s.timestamp, classifier.classify(s)))
        .collect();

    HazardKind::ALL
        .into_iter()
        .flat_map(|kind| {
            aggregate(flagged.iter().map(|(t, c)| (*t, c.get(kind))))
                .into_iter()
                .map(move |run| HazardInterval {
                    location_id: target.location_id,
                    location: target.location.to_string(),
                    series: target.series,
                    kind,
                    start: run.start,
                    length: run.length,
                    magnitude: run.magnitude,
                })
        })
        .collect()
}
