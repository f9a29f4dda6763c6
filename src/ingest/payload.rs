/// Forecast payload envelope and decoding.
///
/// The API returns one object per requested series, each holding a `time`
/// array plus one parallel array per variable:
///
/// ```text
/// {
///   "latitude": 47.42, "longitude": 10.98, "timezone": "GMT",
///   "hourly":      { "time": ["2024-01-05T00:00", ...], "temperature_2m": [...], ... },
///   "minutely_15": { "time": [...], "wind_speed_10m": [...], ... }
/// }
/// ```
///
/// Decoding never fails. Missing arrays, arrays shorter than `time`,
/// nulls and non-numeric entries all become `None` for that sample;
/// unparsable timestamps drop the sample. Every recovery is logged.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::model::{parse_timestamp, Sample, SeriesKind};

// Variable names requested from the API, with legacy aliases after the first.
pub const TEMPERATURE_FIELDS: &[&str] = &["temperature_2m"];
pub const WIND_SPEED_FIELDS: &[&str] = &["wind_speed_10m", "windspeed_10m"];
pub const RAIN_FIELDS: &[&str] = &["rain"];
pub const SNOWFALL_FIELDS: &[&str] = &["snowfall"];
pub const WEATHER_CODE_FIELDS: &[&str] = &["weather_code", "weathercode"];
pub const WIND_DIRECTION_FIELDS: &[&str] = &["wind_direction_10m", "winddirection_10m"];
pub const UV_INDEX_FIELDS: &[&str] = &["uv_index"];

/// Variables requested for a series (primary names only).
pub fn requested_variables(series: SeriesKind) -> Vec<&'static str> {
    let mut vars = vec![
        TEMPERATURE_FIELDS[0],
        RAIN_FIELDS[0],
        SNOWFALL_FIELDS[0],
        WIND_SPEED_FIELDS[0],
        WEATHER_CODE_FIELDS[0],
        WIND_DIRECTION_FIELDS[0],
    ];
    if series == SeriesKind::Hourly {
        vars.push(UV_INDEX_FIELDS[0]);
    }
    vars
}

/// One series object: `time` plus the value arrays, kept loosely typed so
/// that a malformed array never rejects the whole payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SeriesBlock(pub Map<String, Value>);

impl SeriesBlock {
    fn array(&self, name: &str) -> Option<&Vec<Value>> {
        self.0.get(name).and_then(Value::as_array)
    }

    /// First alias that is present and non-empty.
    fn column(&self, aliases: &[&'static str]) -> Option<(&'static str, &Vec<Value>)> {
        aliases
            .iter()
            .find_map(|name| self.array(name).filter(|a| !a.is_empty()).map(|a| (*name, a)))
    }
}

/// Top-level forecast response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastPayload {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub hourly: Option<SeriesBlock>,
    #[serde(default)]
    pub minutely_15: Option<SeriesBlock>,
}

impl ForecastPayload {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn series(&self, series: SeriesKind) -> Option<&SeriesBlock> {
        match series {
            SeriesKind::Hourly => self.hourly.as_ref(),
            SeriesKind::Minutely15 => self.minutely_15.as_ref(),
        }
    }
}

/// Result of decoding one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedSeries {
    /// Samples in strictly ascending timestamp order, one per timestamp.
    pub samples: Vec<Sample>,
    /// Entries dropped because their timestamp could not be parsed.
    pub dropped_timestamps: usize,
    /// Values present but unusable (non-numeric, non-finite, bad code).
    pub invalid_values: usize,
    /// Entries whose timestamp repeated an earlier one (last one wins).
    pub duplicate_timestamps: usize,
}

struct Decoder<'a> {
    location: &'a str,
    series: SeriesKind,
    invalid: usize,
}

impl Decoder<'_> {
    fn number(&mut self, column: Option<(&'static str, &Vec<Value>)>, i: usize, ts: &DateTime<Utc>) -> Option<f64> {
        let (field, values) = column?;
        let value = values.get(i)?;
        let parsed = match value {
            Value::Null => return None,
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(v) if v.is_finite() => Some(v),
            _ => {
                self.invalid += 1;
                warn!(
                    location = self.location,
                    series = %self.series,
                    field,
                    timestamp = %ts,
                    value = %value,
                    "unusable value treated as missing"
                );
                None
            }
        }
    }

    fn code(&mut self, column: Option<(&'static str, &Vec<Value>)>, i: usize, ts: &DateTime<Utc>) -> Option<i32> {
        let field = column.map(|(f, _)| f).unwrap_or("weather_code");
        let v = self.number(column, i, ts)?;
        if v.fract() == 0.0 && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX) {
            Some(v as i32)
        } else {
            self.invalid += 1;
            warn!(
                location = self.location,
                series = %self.series,
                field,
                timestamp = %ts,
                value = v,
                "weather code is not an integer, treated as missing"
            );
            None
        }
    }
}

/// Decodes one series of `payload` into ordered samples.
///
/// A missing series or missing `time` array yields an empty result.
pub fn decode_series(payload: &ForecastPayload, series: SeriesKind, location: &str) -> DecodedSeries {
    let mut out = DecodedSeries::default();
    let Some(block) = payload.series(series) else {
        return out;
    };
    let Some(times) = block.array("time") else {
        warn!(location, series = %series, "series has no time array");
        return out;
    };

    let temperature = block.column(TEMPERATURE_FIELDS);
    let wind_speed = block.column(WIND_SPEED_FIELDS);
    let rain = block.column(RAIN_FIELDS);
    let snowfall = block.column(SNOWFALL_FIELDS);
    let weather_code = block.column(WEATHER_CODE_FIELDS);
    let wind_direction = block.column(WIND_DIRECTION_FIELDS);
    let uv_index = block.column(UV_INDEX_FIELDS);

    let mut decoder = Decoder { location, series, invalid: 0 };
    let mut by_time: BTreeMap<DateTime<Utc>, Sample> = BTreeMap::new();

    for (i, raw) in times.iter().enumerate() {
        let Some(ts) = raw.as_str().and_then(parse_timestamp) else {
            out.dropped_timestamps += 1;
            warn!(location, series = %series, index = i, value = %raw, "unparsable timestamp, sample dropped");
            continue;
        };

        let sample = Sample {
            timestamp: ts,
            temperature: decoder.number(temperature, i, &ts),
            wind_speed: decoder.number(wind_speed, i, &ts),
            rain: decoder.number(rain, i, &ts),
            snowfall: decoder.number(snowfall, i, &ts),
            weather_code: decoder.code(weather_code, i, &ts),
            wind_direction: decoder.number(wind_direction, i, &ts),
            uv_index: decoder.number(uv_index, i, &ts),
        };

        if by_time.insert(ts, sample).is_some() {
            out.duplicate_timestamps += 1;
            warn!(location, series = %series, timestamp = %ts, "duplicate timestamp, keeping the later entry");
        }
    }

    out.invalid_values = decoder.invalid;
    out.samples = by_time.into_values().collect();
    out
}
