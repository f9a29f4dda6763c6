/// Service configuration loader - parses peakwatch.toml
///
/// Separates location coordinates and alert thresholds from code, making it
/// easy to add a summit or tune a threshold without recompiling the service.
/// Every section is optional; omitted values fall back to the defaults
/// documented on each struct.

use chrono::Duration;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::{Location, SeriesKind};

/// Default location of the configuration file, relative to the working
/// directory.
pub const DEFAULT_CONFIG_PATH: &str = "peakwatch.toml";

/// Environment variable that overrides `[alerts] webhook_url`.
pub const WEBHOOK_ENV_VAR: &str = "ALERT_WEBHOOK_URL";

/// Longest accepted alert horizon: the 16-day forecast range.
pub const MAX_HORIZON_HOURS: i64 = 24 * 16;

const OPEN_METEO_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Hazard thresholds handed to the classifier at construction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HazardThresholds {
    /// Wind strictly above this value is hazardous (default 58.0).
    pub wind_speed: f64,
    /// Temperature at or below this value is hazardous (default -10.0).
    pub temperature_low: f64,
    /// Weather codes that indicate precipitation on their own.
    pub precipitation_codes: BTreeSet<i32>,
}

impl Default for HazardThresholds {
    fn default() -> Self {
        Self {
            wind_speed: 58.0,
            temperature_low: -10.0,
            precipitation_codes: [51, 53, 55, 61, 63, 65, 80, 81, 82, 95].into_iter().collect(),
        }
    }
}

/// Alerting window and outbound notification settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Forward-looking window, in hours, in which intervals are alerted.
    pub horizon_hours: i64,
    /// Optional webhook receiving one JSON POST per new alert.
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            horizon_hours: 48,
            webhook_url: None,
            webhook_timeout_secs: 5,
        }
    }
}

impl AlertSettings {
    /// Horizon as a duration, clamped to `1..=MAX_HORIZON_HOURS`.
    pub fn horizon(&self) -> Duration {
        Duration::hours(self.horizon_hours.clamp(1, MAX_HORIZON_HOURS))
    }
}

/// Poll loop settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub poll_interval_minutes: u64,
    /// Locations processed concurrently within one cycle.
    pub workers: usize,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            poll_interval_minutes: 60,
            workers: 4,
        }
    }
}

/// Upstream forecast API settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub past_days: u32,
    pub forecast_days: u32,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// Series requested from the API and merged into the store.
    pub series: Vec<SeriesKind>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: OPEN_METEO_FORECAST_URL.to_string(),
            past_days: 7,
            forecast_days: 3,
            timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 1000,
            series: SeriesKind::ALL.to_vec(),
        }
    }
}

/// Root configuration structure for TOML parsing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub thresholds: HazardThresholds,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default)]
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default, rename = "location")]
    pub locations: Vec<Location>,
}

impl Config {
    /// Parses and validates a configuration document.
    pub fn from_toml_str(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides. Currently only the webhook URL.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(WEBHOOK_ENV_VAR) {
            let url = url.trim();
            self.alerts.webhook_url = if url.is_empty() { None } else { Some(url.to_string()) };
        }
    }

    /// Checks invariants the rest of the service relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if !t.wind_speed.is_finite() || !t.temperature_low.is_finite() {
            return Err(ConfigError::Invalid("thresholds must be finite numbers".into()));
        }
        if self.alerts.horizon_hours <= 0 {
            return Err(ConfigError::Invalid("alerts.horizon_hours must be positive".into()));
        }
        if self.alerts.horizon_hours > MAX_HORIZON_HOURS {
            return Err(ConfigError::Invalid(format!(
                "alerts.horizon_hours must be at most {MAX_HORIZON_HOURS} (got {})",
                self.alerts.horizon_hours
            )));
        }
        if self.daemon.poll_interval_minutes == 0 {
            return Err(ConfigError::Invalid("daemon.poll_interval_minutes must be positive".into()));
        }
        if self.api.max_attempts == 0 {
            return Err(ConfigError::Invalid("api.max_attempts must be at least 1".into()));
        }
        if self.api.series.is_empty() {
            return Err(ConfigError::Invalid("api.series must name at least one series".into()));
        }
        if self.locations.is_empty() {
            return Err(ConfigError::Invalid("at least one [[location]] is required".into()));
        }

        let mut seen = HashSet::new();
        for loc in &self.locations {
            if loc.name.trim().is_empty() {
                return Err(ConfigError::Invalid("location name must not be empty".into()));
            }
            if !seen.insert(loc.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate location name: {}", loc.name)));
            }
            if !(-90.0..=90.0).contains(&loc.latitude) || !(-180.0..=180.0).contains(&loc.longitude) {
                return Err(ConfigError::Invalid(format!(
                    "{}: coordinates out of range ({}, {})",
                    loc.name, loc.latitude, loc.longitude
                )));
            }
        }
        Ok(())
    }

    /// Looks up a configured location by name.
    pub fn location(&self, name: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.name == name)
    }
}

/// Loads configuration from `path`, then applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;

    let mut config = Config::from_toml_str(&contents, &display)?;
    config.apply_env_overrides();
    Ok(config)
}

/// Loads configuration from the default location (peakwatch.toml).
pub fn load_config_default() -> Result<Config, ConfigError> {
    load_config(DEFAULT_CONFIG_PATH)
}
