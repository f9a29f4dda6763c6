/// Core data types for the summit weather watch service.
///
/// This module defines the shared domain model imported by all other modules.
/// It performs no I/O; the only logic here is timestamp normalization and
/// provenance derivation, both of which are pure.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database identity of a location row.
pub type LocationId = i32;

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// A fixed geographic point polled every cycle.
///
/// The name is the natural key: a location is inserted once on first
/// sighting and looked up by name afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation_m: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// The named time series carried by one upstream payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Hourly,
    #[serde(rename = "minutely_15")]
    Minutely15,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 2] = [SeriesKind::Hourly, SeriesKind::Minutely15];

    /// Key of the series object in the payload, and the value stored in
    /// the `series` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Hourly => "hourly",
            SeriesKind::Minutely15 => "minutely_15",
        }
    }

    /// Nominal spacing between consecutive samples.
    pub fn step(&self) -> Duration {
        match self {
            SeriesKind::Hourly => Duration::hours(1),
            SeriesKind::Minutely15 => Duration::minutes(15),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(SeriesKind::Hourly),
            "minutely_15" => Some(SeriesKind::Minutely15),
            _ => None,
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One measurement at one (location, series, timestamp).
///
/// Every value is optional: upstream arrays may be missing, ragged, or
/// contain nulls. `None` always means "unknown", never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub rain: Option<f64>,
    pub snowfall: Option<f64>,
    pub weather_code: Option<i32>,
    pub wind_direction: Option<f64>,
    pub uv_index: Option<f64>,
}

impl Sample {
    /// A sample at `timestamp` with every value unknown.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            temperature: None,
            wind_speed: None,
            rain: None,
            snowfall: None,
            weather_code: None,
            wind_direction: None,
            uv_index: None,
        }
    }
}

/// Parses an upstream timestamp into UTC.
///
/// Accepts RFC 3339 with `Z` or a numeric offset, and the naive forms the
/// forecast API emits when `timezone=UTC` (`2024-01-05T13:00`,
/// `2024-01-05T13:00:00`, with optional fractional seconds). Naive values
/// are interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Hazards
// ---------------------------------------------------------------------------

/// An independent axis of alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    Wind,
    Temperature,
    Precipitation,
}

impl HazardKind {
    pub const ALL: [HazardKind; 3] = [
        HazardKind::Wind,
        HazardKind::Temperature,
        HazardKind::Precipitation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HazardKind::Wind => "wind",
            HazardKind::Temperature => "temperature",
            HazardKind::Precipitation => "precipitation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wind" => Some(HazardKind::Wind),
            "temperature" => Some(HazardKind::Temperature),
            "precipitation" => Some(HazardKind::Precipitation),
            _ => None,
        }
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A maximal run of consecutive flagged samples for one hazard kind.
///
/// Transient: rebuilt every cycle from the in-horizon window and handed to
/// the alert recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardInterval {
    pub location_id: LocationId,
    pub location: String,
    pub series: SeriesKind,
    pub kind: HazardKind,
    pub start: DateTime<Utc>,
    /// Number of consecutive samples in the run (always >= 1).
    pub length: usize,
    /// Magnitude of the first sample of the run.
    pub magnitude: f64,
}

impl HazardInterval {
    /// Wall-clock span covered by the run, assuming nominal series spacing.
    /// Saturates at `Duration::MAX`.
    pub fn duration(&self) -> Duration {
        let steps = i32::try_from(self.length).unwrap_or(i32::MAX);
        self.series.step().checked_mul(steps).unwrap_or(Duration::MAX)
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Where an alert sits relative to the time it was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Start time is at or before processing time.
    Historical,
    /// Start time is strictly after processing time.
    Predicted,
    /// Start time could not be determined.
    Detected,
}

impl Provenance {
    /// Classifies an alert start against the processing clock.
    pub fn classify(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match start {
            Some(t) if t > now => Provenance::Predicted,
            Some(_) => Provenance::Historical,
            None => Provenance::Detected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Historical => "historical",
            Provenance::Predicted => "predicted",
            Provenance::Detected => "detected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "historical" => Some(Provenance::Historical),
            "predicted" => Some(Provenance::Predicted),
            "detected" => Some(Provenance::Detected),
            _ => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted alert. Exactly one exists per (location, kind, start).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub location_id: LocationId,
    pub location: String,
    pub kind: HazardKind,
    pub series: SeriesKind,
    pub start: DateTime<Utc>,
    pub length: usize,
    pub magnitude: f64,
    pub message: String,
    pub provenance: Provenance,
}

/// Identity used for alert deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertKey {
    pub location_id: LocationId,
    pub kind: HazardKind,
    pub start: DateTime<Utc>,
}

impl AlertRecord {
    pub fn key(&self) -> AlertKey {
        AlertKey {
            location_id: self.location_id,
            kind: self.kind,
            start: self.start,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_naive_minute_precision_as_utc() {
        let t = parse_timestamp("2024-01-05T13:00").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 5, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_offset_qualified_normalizes_to_utc() {
        let t = parse_timestamp("2024-01-05T14:00:00+01:00").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 5, 13, 0, 0).unwrap());

        let z = parse_timestamp("2024-01-05T13:00:00Z").unwrap();
        assert_eq!(t, z);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("2024-13-40T99:00").is_none());
    }

    #[test]
    fn test_provenance_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        assert_eq!(Provenance::classify(Some(now), now), Provenance::Historical);
        assert_eq!(
            Provenance::classify(Some(now + Duration::seconds(1)), now),
            Provenance::Predicted
        );
        assert_eq!(
            Provenance::classify(Some(now - Duration::hours(3)), now),
            Provenance::Historical
        );
        assert_eq!(Provenance::classify(None, now), Provenance::Detected);
    }

    #[test]
    fn test_interval_duration_uses_series_step() {
        let interval = HazardInterval {
            location_id: 1,
            location: "Zugspitze".to_string(),
            series: SeriesKind::Minutely15,
            kind: HazardKind::Wind,
            start: Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap(),
            length: 3,
            magnitude: 61.0,
        };
        assert_eq!(interval.duration(), Duration::minutes(45));
    }

    #[test]
    fn test_interval_duration_saturates_on_huge_runs() {
        let interval = HazardInterval {
            location_id: 1,
            location: "Zugspitze".to_string(),
            series: SeriesKind::Hourly,
            kind: HazardKind::Wind,
            start: Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap(),
            length: usize::MAX,
            magnitude: 61.0,
        };
        assert_eq!(interval.duration(), Duration::hours(i64::from(i32::MAX)));
    }

    #[test]
    fn test_enum_string_round_trip() {
        for kind in HazardKind::ALL {
            assert_eq!(HazardKind::parse(kind.as_str()), Some(kind));
        }
        for series in SeriesKind::ALL {
            assert_eq!(SeriesKind::parse(series.as_str()), Some(series));
        }
        assert_eq!(Provenance::parse("predicted"), Some(Provenance::Predicted));
    }
}
