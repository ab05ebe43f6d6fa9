//! Undo of an applied decision batch
//!
//! Facts written by augmentation carry the hit's task id, so undoing a batch
//! deletes exactly those rows, returns the task's hits to the queue and puts
//! the record back to `unreviewed`. Canonical-authority batches may have
//! merged clusters; those are not reversed.

use chrono::Utc;
use gaz_common::events::{EventBus, GazEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::{self, facts::FactCounts};
use crate::error::{ReviewError, ReviewResult};
use crate::models::{Authority, RecordId, ReviewStatus};
use crate::utils::begin_monitored;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoReport {
    pub record_id: RecordId,
    pub authority: Authority,
    pub task_id: String,
    pub facts_removed: FactCounts,
    pub hits_reset: u64,
}

pub struct UndoHandler {
    db: SqlitePool,
    event_bus: EventBus,
    canonical: Authority,
}

impl UndoHandler {
    pub fn new(db: SqlitePool, event_bus: EventBus, canonical: Authority) -> Self {
        Self {
            db,
            event_bus,
            canonical,
        }
    }

    pub async fn undo(
        &self,
        record_id: RecordId,
        task_id: &str,
        authority: &Authority,
    ) -> ReviewResult<UndoReport> {
        if *authority == self.canonical {
            return Err(ReviewError::UndoUnsupported(format!(
                "decisions against {} may have merged clusters",
                authority
            )));
        }

        let mut tx = begin_monitored(&self.db, "undo::undo").await?;
        let conn = tx.conn()?;

        db::review_status::set_status(conn, record_id, authority, ReviewStatus::Unreviewed).await?;

        let hits = db::hits::hits_for_task(conn, record_id, authority, task_id).await?;
        if hits.is_empty() {
            return Err(ReviewError::NotFound(format!(
                "task {} on record {} for {}",
                task_id, record_id, authority
            )));
        }
        let record = db::records::get_record(conn, record_id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("record {}", record_id)))?;

        let links_before = db::facts::count_links(conn, record_id).await?;
        let facts_removed = db::facts::delete_task_facts(conn, record_id, task_id).await?;
        let links_after = db::facts::count_links(conn, record_id).await?;

        let unlinked = if links_before > 0 && links_after == 0 { -1 } else { 0 };
        db::facts::adjust_link_counters(
            conn,
            record.dataset_id,
            -(facts_removed.links as i64),
            unlinked,
        )
        .await?;

        let hits_reset = db::hits::reset_task(conn, record_id, authority, task_id).await?;

        tx.commit().await?;

        info!(
            record_id,
            authority = %authority,
            task_id,
            facts_removed = facts_removed.total(),
            hits_reset,
            "Decision batch undone"
        );

        self.event_bus.emit_lossy(GazEvent::DecisionUndone {
            record_id,
            authority: authority.to_string(),
            task_id: task_id.to_string(),
            facts_removed: facts_removed.total(),
            timestamp: Utc::now(),
        });

        Ok(UndoReport {
            record_id,
            authority: authority.clone(),
            task_id: task_id.to_string(),
            facts_removed,
            hits_reset,
        })
    }
}
