/// PostgreSQL-backed store (schema `weather`, see sql/001_initial_schema.sql).
///
/// Sample upserts run in a single transaction guarded by a per-location
/// advisory lock, so two writers for the same location never interleave
/// even across processes. Alerts rely on the table's unique key with
/// `ON CONFLICT DO NOTHING`.

use chrono::{DateTime, Utc};
use postgres::{Client, Row};

use super::{AlertStore, LastKnown, StoreConnector, StoreError, TimeSeriesStore};
use crate::db;
use crate::model::{AlertRecord, HazardKind, Location, LocationId, Provenance, Sample, SeriesKind};

const UPSERT_SAMPLE_SQL: &str = "
    INSERT INTO weather.samples
        (location_id, series, observed_at, temperature, wind_speed, rain,
         snowfall, weather_code, wind_direction, uv_index)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (location_id, series, observed_at) DO UPDATE SET
        temperature    = EXCLUDED.temperature,
        wind_speed     = EXCLUDED.wind_speed,
        rain           = EXCLUDED.rain,
        snowfall       = EXCLUDED.snowfall,
        weather_code   = EXCLUDED.weather_code,
        wind_direction = EXCLUDED.wind_direction,
        uv_index       = EXCLUDED.uv_index,
        ingested_at    = now()
    WHERE (weather.samples.temperature, weather.samples.wind_speed, weather.samples.rain,
           weather.samples.snowfall, weather.samples.weather_code,
           weather.samples.wind_direction, weather.samples.uv_index)
          IS DISTINCT FROM
          (EXCLUDED.temperature, EXCLUDED.wind_speed, EXCLUDED.rain,
           EXCLUDED.snowfall, EXCLUDED.weather_code,
           EXCLUDED.wind_direction, EXCLUDED.uv_index)";

const LAST_KNOWN_SQL: &str = "
    SELECT
        (SELECT temperature FROM weather.samples
          WHERE location_id = $1 AND series = $2 AND temperature IS NOT NULL
          ORDER BY observed_at DESC LIMIT 1),
        (SELECT wind_speed FROM weather.samples
          WHERE location_id = $1 AND series = $2 AND wind_speed IS NOT NULL
          ORDER BY observed_at DESC LIMIT 1),
        (SELECT rain FROM weather.samples
          WHERE location_id = $1 AND series = $2 AND rain IS NOT NULL
          ORDER BY observed_at DESC LIMIT 1),
        (SELECT snowfall FROM weather.samples
          WHERE location_id = $1 AND series = $2 AND snowfall IS NOT NULL
          ORDER BY observed_at DESC LIMIT 1),
        (SELECT weather_code FROM weather.samples
          WHERE location_id = $1 AND series = $2 AND weather_code IS NOT NULL
          ORDER BY observed_at DESC LIMIT 1),
        (SELECT wind_direction FROM weather.samples
          WHERE location_id = $1 AND series = $2 AND wind_direction IS NOT NULL
          ORDER BY observed_at DESC LIMIT 1),
        (SELECT uv_index FROM weather.samples
          WHERE location_id = $1 AND series = $2 AND uv_index IS NOT NULL
          ORDER BY observed_at DESC LIMIT 1)";

/// Store backed by one PostgreSQL connection.
pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects using `DATABASE_URL` and verifies the `weather` schema.
    pub fn connect() -> Result<Self, StoreError> {
        Ok(Self::new(db::connect_and_verify()?))
    }
}

/// Opens a fresh `PgStore` for each worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl StoreConnector for PgConnector {
    type Store = PgStore;

    fn connect(&self) -> Result<PgStore, StoreError> {
        PgStore::connect()
    }
}

impl TimeSeriesStore for PgStore {
    fn ensure_location(&mut self, location: &Location) -> Result<LocationId, StoreError> {
        self.client.execute(
            "INSERT INTO weather.locations (name, latitude, longitude, elevation_m, timezone)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (name) DO NOTHING",
            &[
                &location.name,
                &location.latitude,
                &location.longitude,
                &location.elevation_m,
                &location.timezone,
            ],
        )?;

        let row = self.client.query_one(
            "SELECT id FROM weather.locations WHERE name = $1",
            &[&location.name],
        )?;
        Ok(row.get(0))
    }

    fn watermark(
        &mut self,
        location: LocationId,
        series: SeriesKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = self.client.query_one(
            "SELECT MAX(observed_at) FROM weather.samples
             WHERE location_id = $1 AND series = $2",
            &[&location, &series.as_str()],
        )?;
        Ok(row.get(0))
    }

    fn last_known(&mut self, location: LocationId, series: SeriesKind) -> Result<LastKnown, StoreError> {
        let row = self.client.query_one(LAST_KNOWN_SQL, &[&location, &series.as_str()])?;
        Ok(LastKnown {
            temperature: row.get(0),
            wind_speed: row.get(1),
            rain: row.get(2),
            snowfall: row.get(3),
            weather_code: row.get(4),
            wind_direction: row.get(5),
            uv_index: row.get(6),
        })
    }

    fn upsert(
        &mut self,
        location: LocationId,
        series: SeriesKind,
        samples: &[Sample],
    ) -> Result<usize, StoreError> {
        if samples.is_empty() {
            return Ok(0);
        }

        let mut tx = self.client.transaction()?;
        tx.execute("SELECT pg_advisory_xact_lock($1)", &[&i64::from(location)])?;

        let stmt = tx.prepare(UPSERT_SAMPLE_SQL)?;
        let series_name = series.as_str();
        let mut written = 0;

        for s in samples {
            written += tx.execute(
                &stmt,
                &[
                    &location,
                    &series_name,
                    &s.timestamp,
                    &s.temperature,
                    &s.wind_speed,
                    &s.rain,
                    &s.snowfall,
                    &s.weather_code,
                    &s.wind_direction,
                    &s.uv_index,
                ],
            )? as usize;
        }

        tx.commit()?;
        Ok(written)
    }

    fn sample_count(&mut self, location: LocationId, series: SeriesKind) -> Result<usize, StoreError> {
        let row = self.client.query_one(
            "SELECT COUNT(*) FROM weather.samples WHERE location_id = $1 AND series = $2",
            &[&location, &series.as_str()],
        )?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }
}

impl AlertStore for PgStore {
    fn insert_alert(&mut self, alert: &AlertRecord) -> Result<bool, StoreError> {
        let sample_count = i32::try_from(alert.length).unwrap_or(i32::MAX);
        let rows = self.client.execute(
            "INSERT INTO weather.alerts
                (location_id, hazard_kind, starts_at, series, sample_count,
                 magnitude, message, provenance)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (location_id, hazard_kind, starts_at) DO NOTHING",
            &[
                &alert.location_id,
                &alert.kind.as_str(),
                &alert.start,
                &alert.series.as_str(),
                &sample_count,
                &alert.magnitude,
                &alert.message,
                &alert.provenance.as_str(),
            ],
        )?;
        Ok(rows == 1)
    }

    fn recent_alerts(
        &mut self,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.client.query(
            "SELECT a.location_id, l.name, a.hazard_kind, a.series, a.starts_at,
                    a.sample_count, a.magnitude, a.message, a.provenance
             FROM weather.alerts a
             JOIN weather.locations l ON l.id = a.location_id
             WHERE ($1::TEXT IS NULL OR l.name = $1)
             ORDER BY a.recorded_at DESC, a.id DESC
             LIMIT $2",
            &[&location, &limit],
        )?;

        rows.iter().map(alert_from_row).collect()
    }
}

fn alert_from_row(row: &Row) -> Result<AlertRecord, StoreError> {
    let kind: String = row.get(2);
    let series: String = row.get(3);
    let provenance: String = row.get(8);
    let sample_count: i32 = row.get(5);

    Ok(AlertRecord {
        location_id: row.get(0),
        location: row.get(1),
        kind: HazardKind::parse(&kind)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown hazard kind '{}'", kind)))?,
        series: SeriesKind::parse(&series)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown series '{}'", series)))?,
        start: row.get(4),
        length: usize::try_from(sample_count)
            .map_err(|_| StoreError::CorruptRow(format!("negative sample_count {}", sample_count)))?,
        magnitude: row.get(6),
        message: row.get(7),
        provenance: Provenance::parse(&provenance)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown provenance '{}'", provenance)))?,
    })
}
