//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" once an index failure has been recorded
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// `in-process` or the search cluster URL
    pub index: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if last_error.is_some() { "degraded" } else { "ok" }.to_string(),
        module: "gaz-review".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        index: state
            .config
            .index_url
            .clone()
            .unwrap_or_else(|| "in-process".to_string()),
        last_error,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
