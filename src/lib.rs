/// peakwatch_service: summit weather ingestion and hazard alerting service.
///
/// # Module structure
///
/// ```text
/// peakwatch_service
/// ├── model       — shared data types (Location, Sample, HazardInterval, AlertRecord, …)
/// ├── config      — TOML registry loader (peakwatch.toml) and environment overrides
/// ├── db          — PostgreSQL connectivity and schema validation
/// ├── store
/// │   ├── postgres — production store (schema `weather`)
/// │   └── memory   — in-process store with the same contract
/// ├── ingest
/// │   ├── open_meteo — forecast API: URL construction + retrying fetch
/// │   ├── payload    — tolerant decoding of the multi-series payload
/// │   └── fixtures (test only) — representative API response payloads
/// ├── merge       — watermark-gated merge with per-column fallback policy
/// ├── hazard
/// │   ├── classify  — per-sample wind / temperature / precipitation flags
/// │   └── intervals — run-length grouping into hazard intervals
/// ├── alert       — alert rendering, provenance and deduplicated recording
/// ├── notify      — webhook notifier draining the alert outbox
/// ├── daemon      — poll-cycle driver (worker pool, cancellation, summaries)
/// └── endpoint    — HTTP status surface (/health, /summary, /alerts)
/// ```

/// Public modules
pub mod alert;
pub mod config;
pub mod daemon;
pub mod db;
pub mod endpoint;
pub mod hazard;
pub mod ingest;
pub mod merge;
pub mod model;
pub mod notify;
pub mod store;
