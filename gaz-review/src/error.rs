//! Error types for gaz-review
//!
//! `ReviewError` is the engine taxonomy returned by the services; `ApiError`
//! maps it (and everything else a handler can hit) onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::index::IndexError;
use crate::services::index_plan::MergeStep;
use crate::models::{ClusterRef, RecordId};

/// Review engine errors
#[derive(Debug, Error)]
pub enum ReviewError {
    /// The record or one of its hits changed after the reviewer loaded it
    #[error("Stale review state for record {record_id}: {reason}")]
    StaleState { record_id: RecordId, reason: String },

    /// A match target no longer resolves to a cluster root
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(ClusterRef),

    /// A multi-step merge failed part way through
    #[error("Merge aborted at {failed:?} after {} completed step(s): {source}", .completed.len())]
    PartialMerge {
        failed: MergeStep,
        completed: Vec<MergeStep>,
        pending: Vec<MergeStep>,
        #[source]
        source: IndexError,
    },

    /// A removal's index writes failed part way through
    #[error("Removal aborted at {failed:?} after {} completed step(s): {source}", .completed.len())]
    PartialRemoval {
        failed: MergeStep,
        completed: Vec<MergeStep>,
        pending: Vec<MergeStep>,
        #[source]
        source: IndexError,
    },

    /// The document index could not be reached or rejected the call
    #[error("Index store unavailable: {0}")]
    StoreUnavailable(#[from] IndexError),

    /// Candidate payload failed validation
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The record already has a cluster document
    #[error("Record {0} is already indexed")]
    AlreadyIndexed(RecordId),

    #[error("Undo is not supported for authority '{0}'")]
    UndoUnsupported(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Common error: {0}")]
    Common(#[from] gaz_common::Error),
}

impl ReviewError {
    /// Index write failures, surfaced on the health endpoint
    pub fn is_index_failure(&self) -> bool {
        matches!(
            self,
            ReviewError::PartialMerge { .. }
                | ReviewError::PartialRemoval { .. }
                | ReviewError::StoreUnavailable(_)
        )
    }
}

/// Result type for engine operations
pub type ReviewResult<T> = Result<T, ReviewError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Review engine error
    #[error(transparent)]
    Review(#[from] ReviewError),

    /// gaz-common error
    #[error("Common error: {0}")]
    Common(#[from] gaz_common::Error),
}

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String, Option<Value>) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, None)
            }
            ApiError::Common(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
                None,
            ),
            ApiError::Review(err) => review_parts(err),
        }
    }
}

fn review_parts(err: ReviewError) -> (StatusCode, &'static str, String, Option<Value>) {
    let message = err.to_string();
    match err {
        ReviewError::StaleState { .. } => (StatusCode::CONFLICT, "STALE_STATE", message, None),
        ReviewError::AlreadyIndexed(_) => (StatusCode::CONFLICT, "ALREADY_INDEXED", message, None),
        ReviewError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", message, None),
        ReviewError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", message, None),
        ReviewError::UnresolvedReference(_) => {
            (StatusCode::BAD_REQUEST, "UNRESOLVED_REFERENCE", message, None)
        }
        ReviewError::UndoUnsupported(_) => {
            (StatusCode::BAD_REQUEST, "UNDO_UNSUPPORTED", message, None)
        }
        ReviewError::StoreUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", message, None)
        }
        ReviewError::PartialMerge {
            failed,
            completed,
            pending,
            ..
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "PARTIAL_MERGE",
            message,
            Some(json!({
                "failed": failed,
                "completed": completed,
                "pending": pending,
            })),
        ),
        ReviewError::PartialRemoval {
            failed,
            completed,
            pending,
            ..
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "PARTIAL_REMOVAL",
            message,
            Some(json!({
                "failed": failed,
                "completed": completed,
                "pending": pending,
            })),
        ),
        ReviewError::Database(_) | ReviewError::Common(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message, None)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, detail) = self.parts();

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(detail) = detail {
            error["detail"] = detail;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
