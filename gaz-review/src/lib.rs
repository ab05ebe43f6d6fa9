//! gaz-review library interface
//!
//! Reconciliation review and canonical index consolidation. Exposed as a
//! library so integration tests can drive the services and the router
//! directly.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, ReviewError, ReviewResult};

use axum::Router;
use chrono::{DateTime, Utc};
use gaz_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::ReviewConfig;
use crate::index::IndexStore;
use crate::services::{DecisionProcessor, PassController, RemovalService, UndoHandler};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Canonical document index
    pub index: Arc<dyn IndexStore>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub config: Arc<ReviewConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, index: Arc<dyn IndexStore>, event_bus: EventBus, config: ReviewConfig) -> Self {
        Self {
            db,
            index,
            event_bus,
            config: Arc::new(config),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn pass_controller(&self) -> PassController {
        PassController::new(self.db.clone())
    }

    pub fn decision_processor(&self) -> DecisionProcessor {
        DecisionProcessor::new(
            self.db.clone(),
            self.index.clone(),
            self.event_bus.clone(),
            self.config.canonical.clone(),
        )
    }

    pub fn removal_service(&self) -> RemovalService {
        RemovalService::new(
            self.db.clone(),
            self.index.clone(),
            self.event_bus.clone(),
            self.config.bulk_chunk_size,
        )
    }

    pub fn undo_handler(&self) -> UndoHandler {
        UndoHandler::new(self.db.clone(), self.event_bus.clone(), self.config.canonical.clone())
    }

    /// Remember a failure for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::review_routes())
        .merge(api::index_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
