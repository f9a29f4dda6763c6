//! Summit Weather Watch - Main Daemon
//!
//! A server-side daemon that, every poll cycle:
//! 1. Fetches hourly and 15-minute forecasts for each configured summit
//! 2. Merges new samples into PostgreSQL behind a per-series watermark
//! 3. Detects wind, cold and precipitation intervals in the next 48 hours
//! 4. Records each interval once as an alert and optionally posts it to a webhook
//!
//! Usage:
//!   cargo run --release                      # Continuous polling
//!   cargo run --release -- --once            # Single cycle, then exit
//!   cargo run --release -- --endpoint 8080   # With HTTP status endpoint on port 8080
//!   cargo run --release -- --memory --once   # Dry run without a database
//!
//! SIGINT / SIGTERM stop the daemon after the step in progress.
//!
//! Environment:
//!   DATABASE_URL          - PostgreSQL connection string
//!   ALERT_WEBHOOK_URL     - overrides [alerts] webhook_url
//!   RUST_LOG              - tracing filter (takes precedence)
//!   PEAKWATCH_LOG_LEVEL   - trace|debug|info|warn|error (default: info)
//!   FORCE_COLOR           - 1/0 to force coloured log output on or off

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use peakwatch_service::alert::AlertRecorder;
use peakwatch_service::config::{self, Config};
use peakwatch_service::daemon::{Daemon, DaemonConfig, Pipeline, SharedSummary};
use peakwatch_service::endpoint;
use peakwatch_service::ingest::OpenMeteoClient;
use peakwatch_service::notify;
use peakwatch_service::store::{MemoryStore, PgConnector, PgStore, StoreConnector};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "peakwatch_service", version, about = "Summit weather ingestion and hazard alerting daemon")]
struct Cli {
    /// Path to the TOML registry.
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run a single poll cycle and exit.
    #[arg(long)]
    once: bool,

    /// Serve /health, /summary and /alerts on this port.
    #[arg(long, value_name = "PORT")]
    endpoint: Option<u16>,

    /// Override [daemon] workers.
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Use the in-process store instead of PostgreSQL.
    #[arg(long)]
    memory: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();
    init_tracing();

    println!("⛰  Summit Weather Watch");
    println!("=======================\n");

    let mut config = config::load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(workers) = cli.workers {
        config.daemon.workers = workers.max(1);
    }

    if cli.memory {
        warn!("using in-process store, nothing will be persisted");
        serve(&cli, &config, MemoryStore::new())
    } else {
        // Fail fast with the setup message before any worker starts.
        PgStore::connect().context("database is not ready")?;
        info!("database connection verified");
        serve(&cli, &config, PgConnector)
    }
}

fn serve<C: StoreConnector>(cli: &Cli, config: &Config, connector: C) -> Result<()> {
    let daemon_config = DaemonConfig::from_config(config);
    let source = OpenMeteoClient::new(config.api.clone()).context("building HTTP client")?;

    let mut notifier = None;
    let recorder = match config.alerts.webhook_url.as_deref() {
        Some(url) => {
            let timeout = Duration::from_secs(config.alerts.webhook_timeout_secs);
            let (outbox, handle) = notify::spawn(url, timeout).context("starting notifier")?;
            notifier = Some(handle);
            AlertRecorder::with_outbox(outbox)
        }
        None => AlertRecorder::new(),
    };

    let pipeline = Pipeline::new(source, config.thresholds.clone(), recorder, &daemon_config);
    let connector = Arc::new(connector);
    let daemon = Daemon::new(daemon_config, config.locations.clone(), Arc::clone(&connector), pipeline);

    install_shutdown_handler(daemon.cancel_handle()).context("installing signal handler")?;

    if let Some(port) = cli.endpoint {
        start_endpoint(port, connector, daemon.summary_handle());
    }

    info!(
        locations = daemon.locations().len(),
        horizon_hours = config.alerts.horizon_hours,
        webhook = config.alerts.webhook_url.is_some(),
        "daemon initialized"
    );

    if cli.once {
        let summary = daemon.run_cycle();
        drop(daemon);
        if let Some(handle) = notifier {
            // Outbox closes with the daemon; let queued notifications drain.
            if handle.join().is_err() {
                error!("notifier thread panicked");
            }
        }
        if summary.locations_failed > 0 {
            anyhow::bail!("{} of {} locations failed", summary.locations_failed, config.locations.len());
        }
        return Ok(());
    }

    daemon.run();
    info!("daemon stopped");
    Ok(())
}

/// Sets `cancel` on SIGINT or SIGTERM. Work in flight stops at the next
/// step boundary and the poll loop exits instead of scheduling another cycle.
fn install_shutdown_handler(cancel: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        if cancel.swap(true, Ordering::Relaxed) {
            warn!("shutdown already in progress");
        } else {
            info!("shutdown requested, stopping after the current step");
        }
    })
}

fn start_endpoint<C: StoreConnector>(port: u16, connector: Arc<C>, summary: SharedSummary) {
    let spawned = std::thread::Builder::new()
        .name("endpoint".to_string())
        .spawn(move || match connector.connect() {
            Ok(store) => {
                if let Err(e) = endpoint::start_endpoint_server(port, store, summary) {
                    error!(error = %e, "endpoint server stopped");
                }
            }
            Err(e) => error!(error = %e, "endpoint has no store, continuing without it"),
        });
    if let Err(e) = spawned {
        error!(error = %e, "could not start endpoint thread");
    }
}

fn init_tracing() {
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // RUST_LOG wins; otherwise PEAKWATCH_LOG_LEVEL, defaulting to info
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("PEAKWATCH_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},reqwest=warn,tiny_http=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
