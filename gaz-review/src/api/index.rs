//! Canonical index maintenance handlers
//!
//! POST /index/remove, GET /index/:dataset/audit

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::{Authority, RecordId};
use crate::services::{audit_dataset, IntegrityReport, RemovalReport};
use crate::AppState;

/// POST /index/remove request
#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub record_ids: Vec<RecordId>,
    /// Review queue to clear; defaults to the canonical authority
    #[serde(default)]
    pub authority: Option<Authority>,
}

/// POST /index/remove
pub async fn remove_records(
    State(state): State<AppState>,
    Json(request): Json<RemoveRequest>,
) -> ApiResult<Json<RemovalReport>> {
    if request.record_ids.is_empty() {
        return Err(ApiError::BadRequest("record_ids is empty".to_string()));
    }
    let authority = request
        .authority
        .unwrap_or_else(|| state.config.canonical.clone());

    match state
        .removal_service()
        .remove_records(&request.record_ids, &authority)
        .await
    {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            if e.is_index_failure() {
                tracing::error!(records = request.record_ids.len(), error = %e, "Removal aborted");
                state.record_error(e.to_string()).await;
            }
            Err(e.into())
        }
    }
}

/// GET /index/:dataset/audit
pub async fn audit(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> ApiResult<Json<IntegrityReport>> {
    Ok(Json(audit_dataset(&*state.index, &dataset).await?))
}

pub fn index_routes() -> Router<AppState> {
    Router::new()
        .route("/index/remove", post(remove_records))
        .route("/index/:dataset/audit", get(audit))
}
