/// HTTP status endpoint for operators
///
/// Small read-only JSON surface served from a background thread.
///
/// Endpoints:
/// - GET /health                          - Service health check
/// - GET /summary                         - Totals from the last finished poll cycle
/// - GET /alerts?location={name}&limit={n} - Most recently recorded alerts

use serde_json::{json, Value};
use std::io::Cursor;
use tracing::{info, warn};

use crate::daemon::SharedSummary;
use crate::store::AlertStore;

const DEFAULT_ALERT_LIMIT: usize = 50;
const MAX_ALERT_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Query parameters accepted by /alerts.
#[derive(Debug, Default, PartialEq)]
pub struct AlertQuery {
    pub location: Option<String>,
    pub limit: usize,
}

impl AlertQuery {
    /// Parses `location` and `limit` from a raw query string. Unknown keys
    /// are ignored; a bad limit falls back to the default.
    pub fn parse(query: &str) -> Self {
        let mut parsed = AlertQuery {
            location: None,
            limit: DEFAULT_ALERT_LIMIT,
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(&value.replace('+', " "))
                .map(|v| v.into_owned())
                .unwrap_or_default();
            match key {
                "location" if !value.is_empty() => parsed.location = Some(value),
                "limit" => {
                    parsed.limit = value
                        .parse::<usize>()
                        .unwrap_or(DEFAULT_ALERT_LIMIT)
                        .clamp(1, MAX_ALERT_LIMIT)
                }
                _ => {}
            }
        }
        parsed
    }
}

/// Resolves one request URL to a status code and JSON body.
pub fn route<S: AlertStore + ?Sized>(url: &str, store: &mut S, summary: &SharedSummary) -> (u16, Value) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    match path {
        "/health" => handle_health(),
        "/summary" => handle_summary(summary),
        "/alerts" => handle_alerts(store, &AlertQuery::parse(query)),
        _ => (
            404,
            json!({
                "error": "Not found",
                "available_endpoints": ["/health", "/summary", "/alerts?location={name}&limit={n}"]
            }),
        ),
    }
}

fn handle_health() -> (u16, Value) {
    (
        200,
        json!({
            "status": "ok",
            "service": "peakwatch_service",
            "version": env!("CARGO_PKG_VERSION")
        }),
    )
}

fn handle_summary(summary: &SharedSummary) -> (u16, Value) {
    let Ok(slot) = summary.lock() else {
        return (500, json!({ "error": "summary unavailable" }));
    };
    match slot.as_ref() {
        Some(s) => match serde_json::to_value(s) {
            Ok(v) => (200, v),
            Err(e) => (500, json!({ "error": e.to_string() })),
        },
        None => (404, json!({ "error": "no poll cycle has completed yet" })),
    }
}

fn handle_alerts<S: AlertStore + ?Sized>(store: &mut S, query: &AlertQuery) -> (u16, Value) {
    match store.recent_alerts(query.location.as_deref(), query.limit) {
        Ok(alerts) => match serde_json::to_value(&alerts) {
            Ok(v) => (200, json!({ "count": alerts.len(), "alerts": v })),
            Err(e) => (500, json!({ "error": e.to_string() })),
        },
        Err(e) => {
            warn!(error = %e, "alert query failed");
            (500, json!({ "error": e.to_string() }))
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port. Blocks serving requests.
pub fn start_endpoint_server<S: AlertStore>(port: u16, mut store: S, summary: SharedSummary) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    info!(port, "HTTP endpoint listening (/health, /summary, /alerts)");

    for request in server.incoming_requests() {
        let (status, body) = route(request.url(), &mut store, &summary);
        if let Err(e) = request.respond(create_response(status, &body)) {
            warn!(error = %e, "failed to send response");
        }
    }

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: &Value) -> tiny_http::Response<Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string());
    let response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));

    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
