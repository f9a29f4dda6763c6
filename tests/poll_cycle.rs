/// Integration tests for the full poll cycle
///
/// Runs fetch → merge → classify → aggregate → record against the
/// in-process store and a canned payload source. No network or database
/// is needed.
///
/// Payload timestamps are generated relative to the current hour so the
/// alert horizon behaves as it does in production.
///
/// Run with: cargo test --test poll_cycle

use chrono::{DateTime, Duration, DurationRound, Utc};
use peakwatch_service::alert::AlertRecorder;
use peakwatch_service::config::HazardThresholds;
use peakwatch_service::daemon::{Daemon, DaemonConfig, Pipeline};
use peakwatch_service::ingest::{FetchError, ForecastPayload, ForecastSource};
use peakwatch_service::model::{AlertRecord, HazardKind, Location, LocationId, Provenance, Sample, SeriesKind};
use peakwatch_service::store::{AlertStore, LastKnown, MemoryStore, StoreConnector, StoreError, TimeSeriesStore};
use serde_json::json;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Payloads by location name; missing names fail like an upstream 503.
#[derive(Clone, Default)]
struct CannedSource(Arc<Mutex<HashMap<String, String>>>);

impl CannedSource {
    fn set(&self, location: &str, payload: String) {
        self.0.lock().unwrap().insert(location.to_string(), payload);
    }
}

impl ForecastSource for CannedSource {
    fn fetch(&self, location: &Location) -> Result<ForecastPayload, FetchError> {
        let payloads = self.0.lock().unwrap();
        let json = payloads
            .get(&location.name)
            .ok_or(FetchError::Exhausted { attempts: 3, last: "HTTP 503".to_string() })?;
        Ok(ForecastPayload::from_json(json)?)
    }
}

fn summit(name: &str) -> Location {
    Location {
        name: name.to_string(),
        latitude: 45.9763,
        longitude: 7.6586,
        elevation_m: Some(4478.0),
        timezone: None,
    }
}

fn base_hour() -> DateTime<Utc> {
    Utc::now().duration_trunc(Duration::hours(1)).unwrap()
}

/// Hourly series of `wind.len()` samples starting at `start`.
fn hourly_payload(start: DateTime<Utc>, wind: &[f64], codes: &[i32]) -> String {
    let times: Vec<String> = (0..wind.len())
        .map(|i| (start + Duration::hours(i as i64)).format("%Y-%m-%dT%H:%M").to_string())
        .collect();
    json!({
        "latitude": 45.98,
        "longitude": 7.66,
        "timezone": "GMT",
        "hourly": {
            "time": times,
            "temperature_2m": vec![-5.0; wind.len()],
            "rain": vec![0.0; wind.len()],
            "snowfall": vec![0.0; wind.len()],
            "wind_speed_10m": wind,
            "weather_code": codes,
        }
    })
    .to_string()
}

/// Three hours of history followed by seven forecast hours.
///
/// In-horizon hazards: wind at +1h..+2h (70 then 75), wind at +4h (80),
/// precipitation by code at +5h.
fn matterhorn_payload(base: DateTime<Utc>) -> String {
    hourly_payload(
        base - Duration::hours(3),
        &[90.0, 90.0, 90.0, 90.0, 70.0, 75.0, 20.0, 80.0, 10.0, 10.0],
        &[3, 3, 3, 3, 3, 3, 3, 3, 61, 3],
    )
}

fn build(source: &CannedSource, store: &MemoryStore, names: &[&str], recorder: AlertRecorder) -> Daemon<MemoryStore, CannedSource> {
    let config = DaemonConfig {
        series: vec![SeriesKind::Hourly],
        workers: 2,
        ..DaemonConfig::default()
    };
    let pipeline = Pipeline::new(source.clone(), HazardThresholds::default(), recorder, &config);
    Daemon::new(config, names.iter().map(|n| summit(n)).collect(), store.clone(), pipeline)
}

// ---------------------------------------------------------------------------
// Full cycle
// ---------------------------------------------------------------------------

#[test]
fn test_cycle_records_in_horizon_intervals_once() {
    let base = base_hour();
    let now = base + Duration::minutes(30);
    let source = CannedSource::default();
    source.set("Matterhorn", matterhorn_payload(base));
    let mut store = MemoryStore::new();
    let daemon = build(&source, &store, &["Matterhorn"], AlertRecorder::new());

    let first = daemon.run_cycle_at(now);
    assert_eq!(first.locations_ok, 1);
    assert_eq!(first.rows_merged[&SeriesKind::Hourly], 10);
    assert_eq!(first.intervals[&HazardKind::Wind], 2);
    assert_eq!(first.intervals[&HazardKind::Precipitation], 1);
    assert!(!first.intervals.contains_key(&HazardKind::Temperature));
    assert_eq!(first.alerts_recorded, 3);

    let alerts = store.recent_alerts(Some("Matterhorn"), 10).unwrap();
    assert_eq!(alerts.len(), 3);
    assert!(alerts.iter().all(|a| a.provenance == Provenance::Predicted));

    let mut wind: Vec<_> = alerts.iter().filter(|a| a.kind == HazardKind::Wind).collect();
    wind.sort_by_key(|a| a.start);
    assert_eq!((wind[0].start, wind[0].length, wind[0].magnitude), (base + Duration::hours(1), 2, 70.0));
    assert_eq!((wind[1].start, wind[1].length, wind[1].magnitude), (base + Duration::hours(4), 1, 80.0));

    let precip = alerts.iter().find(|a| a.kind == HazardKind::Precipitation).unwrap();
    assert_eq!(precip.magnitude, 0.0);
    assert_eq!(precip.length, 1);
}

#[test]
fn test_rerunning_identical_window_adds_nothing() {
    let base = base_hour();
    let now = base + Duration::minutes(30);
    let source = CannedSource::default();
    source.set("Matterhorn", matterhorn_payload(base));
    let store = MemoryStore::new();
    let daemon = build(&source, &store, &["Matterhorn"], AlertRecorder::new());

    daemon.run_cycle_at(now);
    let second = daemon.run_cycle_at(now);

    assert_eq!(second.total_rows_merged(), 0);
    assert_eq!(second.alerts_recorded, 0);
    assert_eq!(second.duplicates_suppressed, 3);
    assert_eq!(store.alert_count().unwrap(), 3);
}

#[test]
fn test_overlapping_window_only_merges_newer_samples() {
    let base = base_hour();
    let source = CannedSource::default();
    source.set("Matterhorn", matterhorn_payload(base));
    let mut store = MemoryStore::new();
    let daemon = build(&source, &store, &["Matterhorn"], AlertRecorder::new());

    daemon.run_cycle_at(base + Duration::minutes(30));
    let id = store.ensure_location(&summit("Matterhorn")).unwrap();
    let before = store.watermark(id, SeriesKind::Hourly).unwrap();

    // Next poll two hours later: same length window, shifted forward.
    source.set("Matterhorn", matterhorn_payload(base + Duration::hours(2)));
    let later = daemon.run_cycle_at(base + Duration::hours(2) + Duration::minutes(30));

    let after = store.watermark(id, SeriesKind::Hourly).unwrap();
    assert_eq!(later.rows_merged[&SeriesKind::Hourly], 2);
    assert!(after > before);
    assert_eq!(store.sample_count(id, SeriesKind::Hourly).unwrap(), 12);
}

// ---------------------------------------------------------------------------
// Malformed payloads and failures
// ---------------------------------------------------------------------------

#[test]
fn test_ragged_payload_is_tolerated() {
    let base = base_hour();
    let times: Vec<String> = (1..=4)
        .map(|h| (base + Duration::hours(h)).format("%Y-%m-%dT%H:%M").to_string())
        .collect();
    let payload = json!({
        "hourly": {
            "time": times,
            "wind_speed_10m": [61.0, 62.0],
            "weathercode": [3, 3, 3, 95]
        }
    })
    .to_string();

    let source = CannedSource::default();
    source.set("Triglav", payload);
    let mut store = MemoryStore::new();
    let summary = build(&source, &store, &["Triglav"], AlertRecorder::new()).run_cycle_at(base);

    assert_eq!(summary.locations_ok, 1);
    assert_eq!(summary.rows_merged[&SeriesKind::Hourly], 4);

    let alerts = store.recent_alerts(Some("Triglav"), 10).unwrap();
    let wind: Vec<_> = alerts.iter().filter(|a| a.kind == HazardKind::Wind).collect();
    assert_eq!(wind.len(), 1);
    assert_eq!(wind[0].length, 2);
    assert!(alerts.iter().any(|a| a.kind == HazardKind::Precipitation && a.start == base + Duration::hours(4)));
}

#[test]
fn test_failed_location_is_isolated() {
    let base = base_hour();
    let source = CannedSource::default();
    source.set("Matterhorn", matterhorn_payload(base));
    let store = MemoryStore::new();
    let daemon = build(&source, &store, &["Mont Blanc", "Matterhorn", "Zugspitze"], AlertRecorder::new());

    let summary = daemon.run_cycle_at(base + Duration::minutes(30));
    assert_eq!(summary.locations_ok, 1);
    assert_eq!(summary.locations_failed, 2);
    assert_eq!(summary.alerts_recorded, 3);

    let mut failed: Vec<_> = summary.failures.iter().map(|f| f.location.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["Mont Blanc", "Zugspitze"]);
}

/// Memory store whose sample writes fail for one location.
#[derive(Clone)]
struct ReadOnlyFor {
    inner: MemoryStore,
    location: String,
    read_only: bool,
}

impl StoreConnector for ReadOnlyFor {
    type Store = ReadOnlyFor;

    fn connect(&self) -> Result<ReadOnlyFor, StoreError> {
        Ok(self.clone())
    }
}

impl TimeSeriesStore for ReadOnlyFor {
    fn ensure_location(&mut self, location: &Location) -> Result<LocationId, StoreError> {
        self.read_only = location.name == self.location;
        self.inner.ensure_location(location)
    }

    fn watermark(&mut self, location: LocationId, series: SeriesKind) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.inner.watermark(location, series)
    }

    fn last_known(&mut self, location: LocationId, series: SeriesKind) -> Result<LastKnown, StoreError> {
        self.inner.last_known(location, series)
    }

    fn upsert(&mut self, location: LocationId, series: SeriesKind, samples: &[Sample]) -> Result<usize, StoreError> {
        if self.read_only {
            return Err(StoreError::Unavailable("tablespace is read-only".to_string()));
        }
        self.inner.upsert(location, series, samples)
    }

    fn sample_count(&mut self, location: LocationId, series: SeriesKind) -> Result<usize, StoreError> {
        self.inner.sample_count(location, series)
    }
}

impl AlertStore for ReadOnlyFor {
    fn insert_alert(&mut self, alert: &AlertRecord) -> Result<bool, StoreError> {
        self.inner.insert_alert(alert)
    }

    fn recent_alerts(&mut self, location: Option<&str>, limit: usize) -> Result<Vec<AlertRecord>, StoreError> {
        self.inner.recent_alerts(location, limit)
    }
}

#[test]
fn test_store_write_failure_is_isolated() {
    let base = base_hour();
    let source = CannedSource::default();
    source.set("Matterhorn", matterhorn_payload(base));
    source.set("Eiger", matterhorn_payload(base));
    let mut store = MemoryStore::new();
    let connector = ReadOnlyFor {
        inner: store.clone(),
        location: "Eiger".to_string(),
        read_only: false,
    };

    let config = DaemonConfig {
        series: vec![SeriesKind::Hourly],
        workers: 2,
        ..DaemonConfig::default()
    };
    let pipeline = Pipeline::new(source, HazardThresholds::default(), AlertRecorder::new(), &config);
    let daemon = Daemon::new(config, vec![summit("Matterhorn"), summit("Eiger")], connector, pipeline);

    let summary = daemon.run_cycle_at(base + Duration::minutes(30));
    assert_eq!(summary.locations_ok, 1);
    assert_eq!(summary.locations_failed, 1);
    assert_eq!(summary.failures[0].location, "Eiger");
    assert!(summary.failures[0].error.contains("store unavailable: tablespace is read-only"));
    assert_eq!(summary.alerts_recorded, 3);

    assert_eq!(store.recent_alerts(Some("Matterhorn"), 10).unwrap().len(), 3);
    assert!(store.recent_alerts(Some("Eiger"), 10).unwrap().is_empty());
    let eiger = store.ensure_location(&summit("Eiger")).unwrap();
    assert_eq!(store.sample_count(eiger, SeriesKind::Hourly).unwrap(), 0);
}

#[test]
fn test_store_connect_failure_is_isolated() {
    #[derive(Clone)]
    struct Offline;

    impl StoreConnector for Offline {
        type Store = MemoryStore;

        fn connect(&self) -> Result<MemoryStore, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    let base = base_hour();
    let source = CannedSource::default();
    source.set("Matterhorn", matterhorn_payload(base));
    let config = DaemonConfig {
        series: vec![SeriesKind::Hourly],
        ..DaemonConfig::default()
    };
    let pipeline = Pipeline::new(source, HazardThresholds::default(), AlertRecorder::new(), &config);
    let daemon = Daemon::new(config, vec![summit("Matterhorn")], Offline, pipeline);

    let summary = daemon.run_cycle_at(base);
    assert_eq!(summary.locations_failed, 1);
    assert!(summary.failures[0].error.contains("connection refused"));
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[test]
fn test_new_alerts_are_emitted_after_recording() {
    let base = base_hour();
    let source = CannedSource::default();
    source.set("Matterhorn", matterhorn_payload(base));
    let store = MemoryStore::new();
    let (tx, rx) = mpsc::channel();
    let daemon = build(&source, &store, &["Matterhorn"], AlertRecorder::with_outbox(tx));

    daemon.run_cycle_at(base + Duration::minutes(30));
    let emitted: Vec<_> = rx.try_iter().collect();
    assert_eq!(emitted.len(), 3);
    assert!(emitted.iter().all(|a| a.location == "Matterhorn"));

    daemon.run_cycle_at(base + Duration::minutes(30));
    assert_eq!(rx.try_iter().count(), 0);
}
