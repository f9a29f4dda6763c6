/// Upstream forecast ingestion.
///
/// - `payload`    — payload envelope and tolerant decoding into `Sample`s.
/// - `open_meteo` — URL construction and the retrying HTTP client.
/// - `fixtures`   — (test only) representative API response payloads.
///
/// The rest of the service only sees the `ForecastSource` trait: a fetch
/// either yields a parsed payload or fails after its own retries.

pub mod open_meteo;
pub mod payload;

#[cfg(test)]
pub(crate) mod fixtures;

use thiserror::Error;

use crate::model::Location;

pub use open_meteo::OpenMeteoClient;
pub use payload::{decode_series, DecodedSeries, ForecastPayload};

#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx response that is not worth retrying.
    #[error("forecast API returned HTTP {status}")]
    Http { status: u16 },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("response body could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    /// Every attempt failed with a transient error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl FetchError {
    /// Network failures, throttling and server errors are worth another try.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http { status } => *status == 429 || *status >= 500,
            FetchError::Network(_) => true,
            FetchError::Decode(_) | FetchError::Exhausted { .. } => false,
        }
    }
}

/// Anything that can produce a forecast payload for a location.
pub trait ForecastSource: Send + Sync {
    fn fetch(&self, location: &Location) -> Result<ForecastPayload, FetchError>;
}
