/// Poll-cycle driver for the summit weather watch service
///
/// One cycle, for every configured location:
/// 1. Fetch the forecast payload (hourly + minutely_15)
/// 2. Register the location on first sighting
/// 3. Merge each series into the store behind its watermark
/// 4. Classify the fetched window inside the alert horizon and group
///    flagged samples into hazard intervals
/// 5. Record one alert per (location, hazard kind, start)
///
/// Locations are independent: each runs on a pool worker with its own
/// store handle, and a failure is logged and counted without touching
/// the others. A shared cancel flag stops work between steps.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error;
use threadpool::ThreadPool;
use tracing::{error, info, warn};

use crate::alert::{AlertRecorder, RecordOutcome};
use crate::config::{Config, HazardThresholds};
use crate::hazard::{find_intervals, HazardClassifier, Horizon, ScanTarget};
use crate::ingest::{decode_series, FetchError, ForecastSource};
use crate::merge::Merger;
use crate::model::{HazardKind, Location, SeriesKind};
use crate::store::{Store, StoreConnector, StoreError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Time between cycle starts (default: 60 minutes)
    pub poll_interval_minutes: u64,

    /// Locations processed concurrently (default: 4)
    pub workers: usize,

    /// Forward window in which intervals are alerted (default: 48 hours)
    pub horizon: Duration,

    /// Series merged and scanned, in order. The first series to record an
    /// alert for a (location, kind, start) key wins.
    pub series: Vec<SeriesKind>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: 60,
            workers: 4,
            horizon: Duration::hours(48),
            series: SeriesKind::ALL.to_vec(),
        }
    }
}

impl DaemonConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval_minutes: config.daemon.poll_interval_minutes,
            workers: config.daemon.workers.max(1),
            horizon: config.alerts.horizon(),
            series: config.api.series.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
    #[error("cancelled")]
    Cancelled,
    #[error("worker exited without reporting")]
    WorkerLost,
}

/// What one location's pipeline did in one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationReport {
    pub location: String,
    /// Rows inserted or changed, per series.
    pub rows_merged: BTreeMap<SeriesKind, usize>,
    /// Values filled by the fallback policy, per series.
    pub values_backfilled: BTreeMap<SeriesKind, usize>,
    /// Intervals found inside the horizon, per hazard kind.
    pub intervals: BTreeMap<HazardKind, usize>,
    pub alerts: RecordOutcome,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocationFailure {
    pub location: String,
    pub error: String,
}

/// Cycle-level totals, logged at the end of each cycle and served on
/// `/summary`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CycleSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub locations_ok: usize,
    pub locations_failed: usize,
    pub rows_merged: BTreeMap<SeriesKind, usize>,
    pub intervals: BTreeMap<HazardKind, usize>,
    pub alerts_recorded: usize,
    pub duplicates_suppressed: usize,
    pub failures: Vec<LocationFailure>,
}

impl CycleSummary {
    fn absorb(&mut self, report: &LocationReport) {
        self.locations_ok += 1;
        for (series, n) in &report.rows_merged {
            *self.rows_merged.entry(*series).or_default() += n;
        }
        for (kind, n) in &report.intervals {
            *self.intervals.entry(*kind).or_default() += n;
        }
        self.alerts_recorded += report.alerts.recorded;
        self.duplicates_suppressed += report.alerts.suppressed;
    }

    fn fail(&mut self, location: &str, err: &PipelineError) {
        self.locations_failed += 1;
        self.failures.push(LocationFailure {
            location: location.to_string(),
            error: err.to_string(),
        });
    }

    pub fn total_rows_merged(&self) -> usize {
        self.rows_merged.values().sum()
    }

    pub fn total_intervals(&self) -> usize {
        self.intervals.values().sum()
    }
}

/// Latest finished cycle, shared with the status endpoint.
pub type SharedSummary = Arc<Mutex<Option<CycleSummary>>>;

// ---------------------------------------------------------------------------
// Per-location pipeline
// ---------------------------------------------------------------------------

/// Everything a worker needs to process one location.
pub struct Pipeline<F> {
    source: F,
    merger: Merger,
    classifier: HazardClassifier,
    recorder: AlertRecorder,
    horizon: Duration,
    series: Vec<SeriesKind>,
}

impl<F: ForecastSource> Pipeline<F> {
    pub fn new(source: F, thresholds: HazardThresholds, recorder: AlertRecorder, config: &DaemonConfig) -> Self {
        Self {
            source,
            merger: Merger::default(),
            classifier: HazardClassifier::new(thresholds),
            recorder,
            horizon: config.horizon,
            series: config.series.clone(),
        }
    }

    /// Replaces the merger (and with it the fallback policy).
    pub fn with_merger(mut self, merger: Merger) -> Self {
        self.merger = merger;
        self
    }

    /// Runs fetch, merge, classify, aggregate and record for one location.
    ///
    /// Every series is merged in its own transaction, so a cancellation or
    /// failure part way through leaves already-merged series intact.
    pub fn process_location<S: Store + ?Sized>(
        &self,
        store: &mut S,
        location: &Location,
        now: DateTime<Utc>,
        cancel: &AtomicBool,
    ) -> Result<LocationReport, PipelineError> {
        let check = || {
            if cancel.load(Ordering::Relaxed) {
                Err(PipelineError::Cancelled)
            } else {
                Ok(())
            }
        };

        check()?;
        let payload = self.source.fetch(location)?;
        check()?;
        let location_id = store.ensure_location(location)?;
        let horizon = Horizon::starting_at(now, self.horizon);

        let mut report = LocationReport {
            location: location.name.clone(),
            ..LocationReport::default()
        };

        for &series in &self.series {
            check()?;
            let decoded = decode_series(&payload, series, &location.name);
            if decoded.samples.is_empty() {
                warn!(location = %location.name, series = %series, "no samples in payload");
                continue;
            }

            let merged = self.merger.merge(store, location_id, series, &decoded.samples)?;
            report.rows_merged.insert(series, merged.written);
            report.values_backfilled.insert(series, merged.backfilled);

            let target = ScanTarget {
                location_id,
                location: &location.name,
                series,
            };
            let intervals = find_intervals(&self.classifier, &decoded.samples, &horizon, target);
            for interval in &intervals {
                *report.intervals.entry(interval.kind).or_default() += 1;
            }

            let recorded = self.recorder.record(store, &intervals, now)?;
            report.alerts.add(recorded);
        }

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Main daemon state
pub struct Daemon<C, F> {
    config: DaemonConfig,
    locations: Vec<Location>,
    connector: Arc<C>,
    pipeline: Arc<Pipeline<F>>,
    pool: ThreadPool,
    cancel: Arc<AtomicBool>,
    last_summary: SharedSummary,
}

impl<C, F> Daemon<C, F>
where
    C: StoreConnector,
    F: ForecastSource + 'static,
{
    pub fn new(config: DaemonConfig, locations: Vec<Location>, connector: C, pipeline: Pipeline<F>) -> Self {
        let pool = ThreadPool::with_name("location-worker".to_string(), config.workers.max(1));
        Self {
            config,
            locations,
            connector: Arc::new(connector),
            pipeline: Arc::new(pipeline),
            pool,
            cancel: Arc::new(AtomicBool::new(false)),
            last_summary: Arc::new(Mutex::new(None)),
        }
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Flag that stops the current cycle between steps and ends `run`.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn summary_handle(&self) -> SharedSummary {
        Arc::clone(&self.last_summary)
    }

    /// Runs one cycle against the wall clock.
    pub fn run_cycle(&self) -> CycleSummary {
        self.run_cycle_at(Utc::now())
    }

    /// Runs one cycle with `now` as the processing time for the horizon and
    /// provenance.
    pub fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleSummary {
        let mut summary = CycleSummary {
            started_at: Some(Utc::now()),
            ..CycleSummary::default()
        };

        let (tx, rx) = mpsc::channel();
        for location in &self.locations {
            let tx = tx.clone();
            let location = location.clone();
            let connector = Arc::clone(&self.connector);
            let pipeline = Arc::clone(&self.pipeline);
            let cancel = Arc::clone(&self.cancel);

            self.pool.execute(move || {
                let result = connector
                    .connect()
                    .map_err(PipelineError::from)
                    .and_then(|mut store| pipeline.process_location(&mut store, &location, now, &cancel));
                // Receiver outlives every worker within a cycle.
                let _ = tx.send((location.name, result));
            });
        }
        drop(tx);

        let mut reported = Vec::with_capacity(self.locations.len());
        for (name, result) in rx {
            match result {
                Ok(report) => {
                    info!(
                        location = %name,
                        merged = report.rows_merged.values().sum::<usize>(),
                        intervals = report.intervals.values().sum::<usize>(),
                        recorded = report.alerts.recorded,
                        suppressed = report.alerts.suppressed,
                        "location done"
                    );
                    summary.absorb(&report);
                }
                Err(e) => {
                    error!(location = %name, error = %e, "location failed");
                    summary.fail(&name, &e);
                }
            }
            reported.push(name);
        }

        // A panicking worker drops its sender without reporting.
        for location in &self.locations {
            if !reported.contains(&location.name) {
                error!(location = %location.name, "worker lost");
                summary.fail(&location.name, &PipelineError::WorkerLost);
            }
        }

        summary.finished_at = Some(Utc::now());
        info!(
            ok = summary.locations_ok,
            failed = summary.locations_failed,
            merged = summary.total_rows_merged(),
            intervals = summary.total_intervals(),
            recorded = summary.alerts_recorded,
            suppressed = summary.duplicates_suppressed,
            "cycle complete"
        );

        match self.last_summary.lock() {
            Ok(mut slot) => *slot = Some(summary.clone()),
            Err(_) => warn!("summary lock poisoned, /summary not updated"),
        }
        summary
    }

    /// Runs cycles every `poll_interval_minutes` until cancelled.
    pub fn run(&self) {
        info!(
            interval_minutes = self.config.poll_interval_minutes,
            locations = self.locations.len(),
            workers = self.config.workers,
            "starting poll loop"
        );

        let interval = StdDuration::from_secs(self.config.poll_interval_minutes * 60);
        while !self.cancel.load(Ordering::Relaxed) {
            let started = Instant::now();
            self.run_cycle();

            while started.elapsed() < interval {
                if self.cancel.load(Ordering::Relaxed) {
                    break;
                }
                let remaining = interval.saturating_sub(started.elapsed());
                std::thread::sleep(remaining.min(StdDuration::from_secs(1)));
            }
        }
        info!("poll loop stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
