/// Open-Meteo forecast API client.
///
/// Handles URL construction and retrieval for the forecast endpoint:
///   https://api.open-meteo.com/v1/forecast
///
/// Each request asks for a trailing window (`past_days`) plus forecast
/// (`forecast_days`) in UTC, so consecutive polls overlap heavily; the
/// merger's watermark gate is what keeps that overlap out of the store.
///
/// Retries: transient failures (network errors, HTTP 429, HTTP 5xx) are
/// retried up to `max_attempts` times with exponential backoff starting at
/// `initial_backoff_ms`. Each request is bounded by `timeout_secs`.

use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::payload::{requested_variables, ForecastPayload};
use super::{FetchError, ForecastSource};
use crate::config::ApiSettings;
use crate::model::{Location, SeriesKind};

/// Builds a forecast URL for `location` covering the configured series.
///
/// # Example
/// ```
/// use peakwatch_service::config::ApiSettings;
/// use peakwatch_service::ingest::open_meteo::build_forecast_url;
/// use peakwatch_service::model::Location;
///
/// let location = Location {
///     name: "Zugspitze".to_string(),
///     latitude: 47.4212,
///     longitude: 10.9863,
///     elevation_m: None,
///     timezone: None,
/// };
/// let url = build_forecast_url(&ApiSettings::default(), &location);
/// assert!(url.contains("latitude=47.4212"));
/// ```
pub fn build_forecast_url(settings: &ApiSettings, location: &Location) -> String {
    let mut url = format!(
        "{}?latitude={}&longitude={}&past_days={}&forecast_days={}&timezone=UTC",
        settings.base_url,
        location.latitude,
        location.longitude,
        settings.past_days,
        settings.forecast_days,
    );

    for series in &settings.series {
        let vars = requested_variables(*series).join(",");
        url.push_str(&format!("&{}={}", series.as_str(), urlencoding::encode(&vars)));
    }

    url
}

/// Blocking HTTP client for the forecast API.
pub struct OpenMeteoClient {
    http: reqwest::blocking::Client,
    settings: ApiSettings,
}

impl OpenMeteoClient {
    pub fn new(settings: ApiSettings) -> Result<Self, FetchError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("peakwatch_service/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, settings })
    }

    pub fn series(&self) -> &[SeriesKind] {
        &self.settings.series
    }

    fn fetch_once(&self, url: &str) -> Result<ForecastPayload, FetchError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http { status: status.as_u16() });
        }

        let body = response.text()?;
        Ok(ForecastPayload::from_json(&body)?)
    }
}

impl ForecastSource for OpenMeteoClient {
    fn fetch(&self, location: &Location) -> Result<ForecastPayload, FetchError> {
        let url = build_forecast_url(&self.settings, location);
        let attempts = self.settings.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.settings.initial_backoff_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            debug!(location = %location.name, attempt, "fetching forecast");
            match self.fetch_once(&url) {
                Ok(payload) => return Ok(payload),
                Err(e) if e.is_transient() => {
                    warn!(location = %location.name, attempt, error = %e, "transient fetch failure");
                    last_error = e.to_string();
                    if attempt < attempts {
                        thread::sleep(backoff);
                        backoff *= 2;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(FetchError::Exhausted { attempts, last: last_error })
    }
}
