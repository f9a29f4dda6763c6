/// Outbound webhook notifier.
///
/// Runs on its own thread and drains the alert outbox filled by the
/// recorder. Each alert is POSTed as one flat JSON object:
///
/// ```text
/// { "location": "Zugspitze", "timestamp": "2024-01-05T14:00:00+00:00",
///   "hazard_kind": "wind", "magnitude": 61.0,
///   "message": "...", "provenance": "predicted" }
/// ```
///
/// Delivery is best effort: failures are logged and dropped. The thread
/// exits once every sender has been dropped. Without a configured webhook
/// no outbox exists and the recorder only persists.

use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::AlertRecord;

/// Wire form of one alert notification.
#[derive(Debug, Serialize)]
pub struct AlertNotification<'a> {
    pub location: &'a str,
    pub timestamp: String,
    pub hazard_kind: &'static str,
    pub magnitude: f64,
    pub message: &'a str,
    pub provenance: &'static str,
}

impl<'a> From<&'a AlertRecord> for AlertNotification<'a> {
    fn from(alert: &'a AlertRecord) -> Self {
        Self {
            location: &alert.location,
            timestamp: alert.start.to_rfc3339(),
            hazard_kind: alert.kind.as_str(),
            magnitude: alert.magnitude,
            message: &alert.message,
            provenance: alert.provenance.as_str(),
        }
    }
}

/// Posts alerts to one webhook URL.
pub struct WebhookNotifier {
    http: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url: url.into() })
    }

    /// Sends one alert. Never fails; problems are logged.
    pub fn deliver(&self, alert: &AlertRecord) -> bool {
        let body = AlertNotification::from(alert);
        match self.http.post(&self.url).json(&body).send() {
            Ok(resp) if resp.status().is_success() => {
                debug!(location = %alert.location, hazard = %alert.kind, start = %alert.start, "notification delivered");
                true
            }
            Ok(resp) => {
                warn!(
                    location = %alert.location,
                    hazard = %alert.kind,
                    start = %alert.start,
                    status = resp.status().as_u16(),
                    "webhook rejected notification"
                );
                false
            }
            Err(e) => {
                warn!(
                    location = %alert.location,
                    hazard = %alert.kind,
                    start = %alert.start,
                    error = %e,
                    "webhook delivery failed"
                );
                false
            }
        }
    }

    /// Delivers every alert received until the channel closes.
    pub fn run(self, outbox: Receiver<AlertRecord>) {
        let mut delivered = 0usize;
        let mut failed = 0usize;
        for alert in outbox {
            if self.deliver(&alert) {
                delivered += 1;
            } else {
                failed += 1;
            }
        }
        info!(delivered, failed, "notifier stopped");
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("could not build webhook client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("could not start notifier thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Creates the alert outbox and the thread that drains it into `webhook_url`.
pub fn spawn(
    webhook_url: &str,
    timeout: Duration,
) -> Result<(Sender<AlertRecord>, JoinHandle<()>), NotifyError> {
    let notifier = WebhookNotifier::new(webhook_url, timeout)?;
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("notifier".to_string())
        .spawn(move || notifier.run(rx))?;
    info!(url = webhook_url, "alert notifications enabled");
    Ok((tx, handle))
}
