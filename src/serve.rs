//! Read-only JSON API for dashboards
//!
//! `rfwatch serve` → answers on localhost; nothing here writes to the store.
//!
//! | Route           | Query             | Body                          |
//! |-----------------|-------------------|-------------------------------|
//! | `/api/alerts`   |                   | a fresh alert evaluation      |
//! | `/api/signals`  | `limit` (50)      | recent detected signals       |
//! | `/api/sessions` | `limit` (20)      | recent monitoring sessions    |
//! | `/api/spectrum` | `limit` (50)      | recent spectrum records       |
//! | `/api/summary`  |                   | store-wide counts             |

use crate::alerts::AlertEngine;
use crate::config::AlertConfig;
use crate::db::Database;
use crate::error::RepoError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

const MAX_LIMIT: i64 = 1000;

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    fn failure(message: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(message.into()) }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    pub limit: Option<i64>,
}

impl ListParams {
    fn from_url(url: &str) -> Self {
        url.split('?')
            .nth(1)
            .and_then(|query| serde_urlencoded::from_str::<ListParams>(query).ok())
            .unwrap_or_default()
    }

    fn limit_or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

pub struct ApiState {
    db: Arc<Database>,
    engine: AlertEngine,
}

impl ApiState {
    pub fn new(db: Arc<Database>, rules: AlertConfig) -> Self {
        let engine = AlertEngine::new(db.clone(), rules);
        Self { db, engine }
    }

    /// Status code and JSON body for a request line
    pub fn route(&self, method: &Method, url: &str) -> (u16, String) {
        let path = url.split('?').next().unwrap_or("/");
        let params = ListParams::from_url(url);

        if *method != Method::Get {
            return (405, encode(&ApiResponse::failure("method not allowed")));
        }

        let result = match path {
            "/api/alerts" => self.engine.evaluate().map(|v| encode(&ApiResponse::success(v))),
            "/api/signals" => self
                .db
                .recent_signals(params.limit_or(50))
                .map(|v| encode(&ApiResponse::success(v))),
            "/api/sessions" => self
                .db
                .list_sessions(params.limit_or(20))
                .map(|v| encode(&ApiResponse::success(v))),
            "/api/spectrum" => self
                .db
                .recent_spectra(params.limit_or(50))
                .map(|v| encode(&ApiResponse::success(v))),
            "/api/summary" => self.db.get_summary().map(|v| encode(&ApiResponse::success(v))),
            _ => return (404, encode(&ApiResponse::failure("not found"))),
        };

        match result {
            Ok(body) => (200, body),
            Err(e) => storage_failure(path, &e),
        }
    }
}

fn storage_failure(path: &str, e: &RepoError) -> (u16, String) {
    warn!(path, error = %e, "api query failed");
    (500, encode(&ApiResponse::failure(e.to_string())))
}

fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!(r#"{{"ok":false,"data":null,"error":"{}"}}"#, e))
}

/// Serve until the process exits
pub fn start(port: u16, state: ApiState) -> std::io::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let server = Server::http(&addr).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    info!(url = %format!("http://localhost:{}", port), db = %state.db.path().display(), "api listening");

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, &state) {
            warn!(error = %e, "could not answer request");
        }
    }

    Ok(())
}

fn handle_request(request: Request, state: &ApiState) -> std::io::Result<()> {
    let (status, body) = state.route(request.method(), request.url());
    debug!(method = %request.method(), url = request.url(), status, "request");

    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    request.respond(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DetectedSignal;
    use crate::repository::Repository;
    use chrono::Utc;
    use tempfile::TempDir;

    fn state() -> (TempDir, ApiState) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_at(dir.path().join("rf.db")).unwrap());
        let session = db.create_session(60).unwrap();
        for i in 0..3 {
            let signal = DetectedSignal {
                timestamp: Utc::now(),
                frequency_hz: 2.4e9 + i as f64 * 1e6,
                power_dbm: -30.0,
                signal_type: "WIFI".into(),
                confidence: 0.9,
                bandwidth_hz: 20e6,
                modulation: Some("OFDM".into()),
            };
            db.record_signal(session, &signal).unwrap();
        }
        (dir, ApiState::new(db, AlertConfig::default()))
    }

    fn get(state: &ApiState, url: &str) -> (u16, serde_json::Value) {
        let (status, body) = state.route(&Method::Get, url);
        (status, serde_json::from_str(&body).unwrap())
    }

    // ==========================================================================
    // ROUTING TESTS
    // ==========================================================================

    #[test]
    fn test_signals_limit() {
        let (_dir, state) = state();

        let (status, body) = get(&state, "/api/signals?limit=2");
        assert_eq!(status, 200);
        assert_eq!(body["ok"], true);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (_, body) = get(&state, "/api/signals");
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_alerts_and_summary() {
        let (_dir, state) = state();

        let (_, alerts) = get(&state, "/api/alerts");
        // Three high-power signals, and three within the burst window
        assert_eq!(alerts["data"].as_array().unwrap().len(), 4);

        let (_, summary) = get(&state, "/api/summary");
        assert_eq!(summary["data"]["signals"], 3);
        assert_eq!(summary["data"]["open_sessions"], 1);
    }

    #[test]
    fn test_sessions_and_spectrum() {
        let (_dir, state) = state();

        let (_, sessions) = get(&state, "/api/sessions?limit=5");
        assert_eq!(sessions["data"][0]["signals_detected"], 3);

        let (status, spectra) = get(&state, "/api/spectrum");
        assert_eq!(status, 200);
        assert!(spectra["data"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_route_and_method() {
        let (_dir, state) = state();

        let (status, body) = get(&state, "/api/nope");
        assert_eq!(status, 404);
        assert_eq!(body["ok"], false);

        let (status, _) = state.route(&Method::Post, "/api/signals");
        assert_eq!(status, 405);
    }

    #[test]
    fn test_bad_limit_falls_back() {
        let params = ListParams::from_url("/api/signals?limit=abc");
        assert_eq!(params.limit_or(50), 50);
        assert_eq!(ListParams::from_url("/x?limit=0").limit_or(50), 1);
        assert_eq!(ListParams::from_url("/x?limit=99999").limit_or(50), MAX_LIMIT);
    }
}
