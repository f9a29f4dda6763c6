/// Persistence contracts for samples and alerts.
///
/// Two traits split the store along the lines of what writes it:
/// - `TimeSeriesStore` — location registry, per-series watermarks and the
///   idempotent sample upsert used by the merger.
/// - `AlertStore` — the deduplicating alert sink used by the recorder.
///
/// Implementations:
/// - `postgres` — the production store (schema `weather`).
/// - `memory`   — an in-process store with the same semantics, used by the
///   integration tests and for dry runs without a database.
///
/// Both implementations take `&mut self` because a PostgreSQL client is a
/// single connection; concurrency across locations is achieved by giving
/// each worker its own store through a `StoreConnector`.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::db::DbConfigError;
use crate::model::{AlertRecord, Location, LocationId, Sample, SeriesKind};

pub use self::memory::MemoryStore;
pub use self::postgres::{PgConnector, PgStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Postgres(#[from] ::postgres::Error),
    #[error(transparent)]
    Connection(#[from] DbConfigError),
    #[error("unknown location id {0}")]
    UnknownLocation(LocationId),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Most recent stored non-null value of each sample column.
///
/// Used to seed carry-forward backfill for values upstream omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastKnown {
    pub temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub rain: Option<f64>,
    pub snowfall: Option<f64>,
    pub weather_code: Option<i32>,
    pub wind_direction: Option<f64>,
    pub uv_index: Option<f64>,
}

/// Durable per-location sample history keyed by (location, series, timestamp).
pub trait TimeSeriesStore {
    /// Returns the id of `location`, inserting it on first sighting.
    /// Existing rows are never modified.
    fn ensure_location(&mut self, location: &Location) -> Result<LocationId, StoreError>;

    /// Maximum stored timestamp for the series, or `None` if nothing is stored.
    fn watermark(
        &mut self,
        location: LocationId,
        series: SeriesKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Most recent non-null value per column for the series.
    fn last_known(&mut self, location: LocationId, series: SeriesKind) -> Result<LastKnown, StoreError>;

    /// Inserts or replaces `samples` in one transaction.
    ///
    /// Returns the number of rows inserted or changed. Re-submitting a sample
    /// identical to the stored one is a no-op and is not counted.
    fn upsert(
        &mut self,
        location: LocationId,
        series: SeriesKind,
        samples: &[Sample],
    ) -> Result<usize, StoreError>;

    /// Number of stored samples for the series.
    fn sample_count(&mut self, location: LocationId, series: SeriesKind) -> Result<usize, StoreError>;
}

/// Deduplicating alert sink.
pub trait AlertStore {
    /// Persists `alert` unless one already exists for its
    /// (location, kind, start) key. Returns `true` if a row was written.
    fn insert_alert(&mut self, alert: &AlertRecord) -> Result<bool, StoreError>;

    /// Most recently recorded alerts, newest first, optionally for one
    /// location name.
    fn recent_alerts(
        &mut self,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, StoreError>;
}

/// A store usable by the full poll-cycle pipeline.
pub trait Store: TimeSeriesStore + AlertStore {}

impl<T: TimeSeriesStore + AlertStore> Store for T {}

/// Opens one store handle per worker.
pub trait StoreConnector: Send + Sync + 'static {
    type Store: Store;

    fn connect(&self) -> Result<Self::Store, StoreError>;
}

impl<C: StoreConnector> StoreConnector for Arc<C> {
    type Store = C::Store;

    fn connect(&self) -> Result<Self::Store, StoreError> {
        (**self).connect()
    }
}
