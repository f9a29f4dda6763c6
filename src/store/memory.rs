/// In-process store with the same contract as the PostgreSQL store.
///
/// Cloning a `MemoryStore` yields another handle onto the same state, so it
/// doubles as its own `StoreConnector`. A single mutex serializes every
/// write, which trivially satisfies the per-location write ordering.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{AlertStore, LastKnown, StoreConnector, StoreError, TimeSeriesStore};
use crate::model::{AlertKey, AlertRecord, Location, LocationId, Sample, SeriesKind};

#[derive(Debug, Default)]
struct State {
    locations: Vec<Location>,
    by_name: HashMap<String, LocationId>,
    samples: HashMap<(LocationId, SeriesKind), BTreeMap<DateTime<Utc>, Sample>>,
    alerts: BTreeMap<AlertKey, (u64, AlertRecord)>,
    next_alert_seq: u64,
}

impl State {
    fn check_location(&self, id: LocationId) -> Result<(), StoreError> {
        let known = id >= 1 && (id as usize) <= self.locations.len();
        if known { Ok(()) } else { Err(StoreError::UnknownLocation(id)) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Snapshot of the stored samples for one series, in timestamp order.
    pub fn samples(&self, location: LocationId, series: SeriesKind) -> Result<Vec<Sample>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .samples
            .get(&(location, series))
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Total number of persisted alerts.
    pub fn alert_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.alerts.len())
    }
}

impl StoreConnector for MemoryStore {
    type Store = MemoryStore;

    fn connect(&self) -> Result<MemoryStore, StoreError> {
        Ok(self.clone())
    }
}

impl TimeSeriesStore for MemoryStore {
    fn ensure_location(&mut self, location: &Location) -> Result<LocationId, StoreError> {
        let mut state = self.lock()?;
        if let Some(id) = state.by_name.get(&location.name) {
            return Ok(*id);
        }
        state.locations.push(location.clone());
        let id = state.locations.len() as LocationId;
        state.by_name.insert(location.name.clone(), id);
        Ok(id)
    }

    fn watermark(
        &mut self,
        location: LocationId,
        series: SeriesKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .samples
            .get(&(location, series))
            .and_then(|rows| rows.keys().next_back().copied()))
    }

    fn last_known(&mut self, location: LocationId, series: SeriesKind) -> Result<LastKnown, StoreError> {
        let state = self.lock()?;
        let mut last = LastKnown::default();
        let Some(rows) = state.samples.get(&(location, series)) else {
            return Ok(last);
        };

        for s in rows.values().rev() {
            last.temperature = last.temperature.or(s.temperature);
            last.wind_speed = last.wind_speed.or(s.wind_speed);
            last.rain = last.rain.or(s.rain);
            last.snowfall = last.snowfall.or(s.snowfall);
            last.weather_code = last.weather_code.or(s.weather_code);
            last.wind_direction = last.wind_direction.or(s.wind_direction);
            last.uv_index = last.uv_index.or(s.uv_index);
        }
        Ok(last)
    }

    fn upsert(
        &mut self,
        location: LocationId,
        series: SeriesKind,
        samples: &[Sample],
    ) -> Result<usize, StoreError> {
        let mut state = self.lock()?;
        state.check_location(location)?;

        let rows = state.samples.entry((location, series)).or_default();
        let mut written = 0;
        for s in samples {
            match rows.get(&s.timestamp) {
                Some(existing) if existing == s => {}
                _ => {
                    rows.insert(s.timestamp, s.clone());
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    fn sample_count(&mut self, location: LocationId, series: SeriesKind) -> Result<usize, StoreError> {
        let state = self.lock()?;
        Ok(state.samples.get(&(location, series)).map_or(0, BTreeMap::len))
    }
}

impl AlertStore for MemoryStore {
    fn insert_alert(&mut self, alert: &AlertRecord) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        state.check_location(alert.location_id)?;

        let key = alert.key();
        if state.alerts.contains_key(&key) {
            return Ok(false);
        }
        let seq = state.next_alert_seq;
        state.next_alert_seq += 1;
        state.alerts.insert(key, (seq, alert.clone()));
        Ok(true)
    }

    fn recent_alerts(
        &mut self,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, StoreError> {
        let state = self.lock()?;
        let mut matching: Vec<&(u64, AlertRecord)> = state
            .alerts
            .values()
            .filter(|(_, a)| location.is_none_or(|name| a.location == name))
            .collect();
        matching.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(matching.into_iter().take(limit).map(|(_, a)| a.clone()).collect())
    }
}
