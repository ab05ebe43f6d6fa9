//! Decision Processor
//!
//! Applies a reviewer's decision batch for one record × authority in a
//! single transaction:
//!
//! 1. Guard: conditional status update away from the status the reviewer
//!    was shown, plus a check that every named hit is still unreviewed.
//!    Losing a race yields `StaleState` with nothing written.
//! 2. Accepted hits augment the record (non-canonical authority) or are
//!    collected as canonical matches.
//! 3. Hits are flipped to reviewed, or moved to the deferred queue when the
//!    whole batch was deferred.
//! 4. Canonical authority: consolidation runs exactly once.
//!
//! Any failure rolls the transaction back, restoring status and hits.

use chrono::Utc;
use gaz_common::events::{EventBus, GazEvent, ReviewOutcomeKind};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{self, close_matches::EdgeProvenance};
use crate::error::{ReviewError, ReviewResult};
use crate::index::IndexStore;
use crate::models::{Authority, CanonicalMatch, DecisionBatch, Record, ReviewStatus};
use crate::services::augmentation_writer::{self, AugmentReport};
use crate::services::consolidation::{ConsolidationEngine, ConsolidationOutcome, ConsolidationReport};
use crate::utils::begin_monitored;

/// Result of applying one batch
#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub record_id: i64,
    pub authority: Authority,
    pub status: ReviewStatus,
    pub hits_reviewed: u64,
    pub hits_deferred: usize,
    pub augmented: Vec<AugmentReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidation: Option<ConsolidationReport>,
}

pub struct DecisionProcessor {
    db: SqlitePool,
    index: Arc<dyn IndexStore>,
    event_bus: EventBus,
    canonical: Authority,
}

impl DecisionProcessor {
    pub fn new(
        db: SqlitePool,
        index: Arc<dyn IndexStore>,
        event_bus: EventBus,
        canonical: Authority,
    ) -> Self {
        Self {
            db,
            index,
            event_bus,
            canonical,
        }
    }

    pub async fn apply(&self, batch: &DecisionBatch) -> ReviewResult<DecisionOutcome> {
        if batch.decisions.is_empty() {
            return Err(ReviewError::InvalidPayload("decision batch is empty".to_string()));
        }
        let hit_ids: Vec<i64> = batch.decisions.iter().map(|d| d.hit_id).collect();
        let unique: HashSet<i64> = hit_ids.iter().copied().collect();
        if unique.len() != hit_ids.len() {
            return Err(ReviewError::InvalidPayload(
                "decision batch names a hit twice".to_string(),
            ));
        }

        let is_canonical = batch.authority == self.canonical;
        let deferring = batch.is_all_deferred();
        let expected = batch.pass.working_status();
        let target = if deferring {
            ReviewStatus::Deferred
        } else {
            ReviewStatus::Reviewed
        };

        let mut tx = begin_monitored(&self.db, "decision_processor::apply").await?;
        let conn = tx.conn()?;

        // Guard first: the conditional update takes the write lock before any
        // read, so a competing batch waits and then sees the new status
        let guarded =
            db::review_status::transition(conn, batch.record_id, &batch.authority, expected, target)
                .await?;

        let record = db::records::get_record(conn, batch.record_id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("record {}", batch.record_id)))?;
        if record.dataset_id != batch.dataset_id {
            return Err(ReviewError::NotFound(format!(
                "record {} in dataset {}",
                batch.record_id, batch.dataset_id
            )));
        }
        if !guarded {
            let current = db::review_status::get_status(conn, record.id, &batch.authority).await?;
            return Err(ReviewError::StaleState {
                record_id: record.id,
                reason: format!(
                    "expected status {}, found {}",
                    expected.as_str(),
                    current.map(|s| s.as_str()).unwrap_or("none")
                ),
            });
        }
        let hits =
            db::hits::unreviewed_hits_by_id(conn, record.id, &batch.authority, &hit_ids).await?;
        if hits.len() != hit_ids.len() {
            return Err(ReviewError::StaleState {
                record_id: record.id,
                reason: format!(
                    "{} of {} hits already reviewed or not owned by the record",
                    hit_ids.len() - hits.len(),
                    hit_ids.len()
                ),
            });
        }

        let mut augmented = Vec::new();
        let mut canonical_matches: Vec<CanonicalMatch> = Vec::new();
        let mut consolidation = None;
        let mut hits_reviewed = 0;
        let mut hits_deferred = 0;

        if deferring {
            db::hits::relabel_deferred(conn, &hit_ids).await?;
            hits_deferred = hit_ids.len();
        } else {
            for (decision, hit) in batch.decisions.iter().zip(hits.iter()) {
                if !decision.verdict.is_match() {
                    continue;
                }
                if is_canonical {
                    match hit.canonical_match() {
                        Some(m) => canonical_matches.push(m),
                        None => {
                            return Err(ReviewError::InvalidPayload(format!(
                                "hit {} names no canonical cluster or record",
                                hit.id
                            )))
                        }
                    }
                } else {
                    let link_type = decision.verdict.link_type();
                    augmented.push(
                        augmentation_writer::augment(conn, &record, hit, link_type, batch.options)
                            .await?,
                    );
                }
            }

            hits_reviewed = db::hits::mark_reviewed(conn, &hit_ids).await?;

            if is_canonical {
                // Each edge takes the task of the match that named its cluster
                let provenance = EdgeProvenance::review(None, batch.reviewer.clone());
                let report = ConsolidationEngine::new(&*self.index)
                    .consolidate(conn, &record, &canonical_matches, &provenance)
                    .await?;
                consolidation = Some(report);
            }
        }

        tx.commit().await?;

        let outcome_kind = if deferring {
            ReviewOutcomeKind::Deferred
        } else {
            ReviewOutcomeKind::Reviewed
        };
        info!(
            record_id = record.id,
            authority = %batch.authority,
            status = target.as_str(),
            hits_reviewed,
            hits_deferred,
            "Decision batch applied"
        );

        let task_ids: BTreeSet<String> = hits.iter().map(|h| h.task_id.clone()).collect();
        self.event_bus.emit_lossy(GazEvent::DecisionApplied {
            dataset_id: record.dataset_id,
            record_id: record.id,
            authority: batch.authority.to_string(),
            task_ids: task_ids.into_iter().collect(),
            outcome: outcome_kind,
            timestamp: Utc::now(),
        });
        if let Some(report) = &consolidation {
            self.emit_consolidation(&record, report);
        }

        Ok(DecisionOutcome {
            record_id: record.id,
            authority: batch.authority.clone(),
            status: target,
            hits_reviewed,
            hits_deferred,
            augmented,
            consolidation,
        })
    }

    fn emit_consolidation(&self, record: &Record, report: &ConsolidationReport) {
        if !report.dropped.is_empty() {
            warn!(
                record_id = record.id,
                dropped = report.dropped.len(),
                "Some canonical matches no longer resolved"
            );
        }

        let timestamp = Utc::now();
        let event = match &report.outcome {
            ConsolidationOutcome::Created { cluster_id } => GazEvent::ClusterCreated {
                dataset: record.dataset.clone(),
                record_id: record.id,
                cluster_id: *cluster_id,
                timestamp,
            },
            ConsolidationOutcome::Attached {
                cluster_id,
                root_record_id,
            } => GazEvent::RecordAttached {
                dataset: record.dataset.clone(),
                record_id: record.id,
                cluster_id: *cluster_id,
                root_record_id: *root_record_id,
                timestamp,
            },
            ConsolidationOutcome::Merged {
                winner,
                losers,
                reassigned,
                ..
            } => GazEvent::ClustersMerged {
                dataset: record.dataset.clone(),
                record_id: record.id,
                winner_cluster_id: *winner,
                loser_cluster_ids: losers.clone(),
                reassigned: reassigned.clone(),
                timestamp,
            },
        };
        self.event_bus.emit_lossy(event);
    }
}
