//! Review workflow API handlers
//!
//! GET /review/:dataset_id/:authority/next, GET /review/:dataset_id/:authority/progress,
//! POST /review/decisions, POST /review/undo

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::{Authority, DecisionBatch, Pass, RecordId};
use crate::services::{DecisionOutcome, NextUnit, PassPosition, PassProgress, UndoReport};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    /// Defaults to the first pass with work
    pub pass: Option<String>,
}

/// POST /review/undo request
#[derive(Debug, Deserialize)]
pub struct UndoRequest {
    pub record_id: RecordId,
    pub task_id: String,
    pub authority: Authority,
}

/// GET /review/:dataset_id/:authority/next?pass=
pub async fn next_unit(
    State(state): State<AppState>,
    Path((dataset_id, authority)): Path<(i64, String)>,
    Query(query): Query<NextQuery>,
) -> ApiResult<Json<NextUnit>> {
    let authority = Authority::new(authority);
    let controller = state.pass_controller();

    let pass = match query.pass.as_deref() {
        Some(name) => name.parse::<Pass>().map_err(ApiError::BadRequest)?,
        None => match controller.current_pass(dataset_id, &authority).await? {
            PassPosition::Pass(pass) => pass,
            // Exhausted last pass still reports the deferred queue
            PassPosition::Done => Pass::Pass3,
        },
    };

    Ok(Json(controller.next_unit(dataset_id, &authority, pass).await?))
}

/// GET /review/:dataset_id/:authority/progress
pub async fn progress(
    State(state): State<AppState>,
    Path((dataset_id, authority)): Path<(i64, String)>,
) -> ApiResult<Json<PassProgress>> {
    let authority = Authority::new(authority);
    Ok(Json(state.pass_controller().progress(dataset_id, &authority).await?))
}

/// POST /review/decisions
///
/// 409 when another reviewer got there first; nothing is written in that case.
pub async fn submit_decisions(
    State(state): State<AppState>,
    Json(batch): Json<DecisionBatch>,
) -> ApiResult<Json<DecisionOutcome>> {
    match state.decision_processor().apply(&batch).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            if e.is_index_failure() {
                tracing::error!(record_id = batch.record_id, error = %e, "Decision batch aborted");
                state.record_error(e.to_string()).await;
            }
            Err(e.into())
        }
    }
}

/// POST /review/undo
pub async fn undo(
    State(state): State<AppState>,
    Json(request): Json<UndoRequest>,
) -> ApiResult<Json<UndoReport>> {
    let report = state
        .undo_handler()
        .undo(request.record_id, &request.task_id, &request.authority)
        .await?;
    Ok(Json(report))
}

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/review/:dataset_id/:authority/next", get(next_unit))
        .route("/review/:dataset_id/:authority/progress", get(progress))
        .route("/review/decisions", post(submit_decisions))
        .route("/review/undo", post(undo))
}
