//! Record removal
//!
//! Withdraws records from the canonical index and from review. Clusters stay
//! well formed while their members disappear:
//!
//! - a root with surviving children hands the cluster to the child with the
//!   most links (lowest record id on ties), which becomes a new root under a
//!   fresh cluster id and adopts its siblings
//! - a root with nothing surviving is deleted outright
//! - a member is unlisted from its root, unless that root is itself being
//!   removed
//!
//! Documents are deleted in chunks of `bulk_chunk_size`. All index writes
//! run as one [`MergeStep`] plan: a failure after the first applied step is
//! `PartialRemoval`, since the index no longer matches either side of the
//! hand-over and needs repair rather than a retry.

use chrono::Utc;
use gaz_common::events::{EventBus, GazEvent, RootPromotion};
use serde::Serialize;
use sqlx::SqlitePool;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::{self, cluster_counter};
use crate::error::{ReviewError, ReviewResult};
use crate::index::{merge_names, ClusterDocument, IndexStore};
use crate::models::{Authority, ClusterId, RecordId};
use crate::services::index_plan::{execute_plan, MergeStep, PlanAbort};
use crate::utils::begin_monitored;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    /// Records withdrawn from review
    pub removed: usize,
    /// Index documents actually deleted
    pub documents_deleted: usize,
    pub promotions: Vec<RootPromotion>,
}

/// Cluster hand-over planned for a removed root
#[derive(Debug)]
struct Adoption {
    old_root: ClusterDocument,
    heir: ClusterDocument,
    siblings: Vec<ClusterDocument>,
}

pub struct RemovalService {
    db: SqlitePool,
    index: Arc<dyn IndexStore>,
    event_bus: EventBus,
    bulk_chunk_size: usize,
}

impl RemovalService {
    pub fn new(
        db: SqlitePool,
        index: Arc<dyn IndexStore>,
        event_bus: EventBus,
        bulk_chunk_size: usize,
    ) -> Self {
        Self {
            db,
            index,
            event_bus,
            bulk_chunk_size: bulk_chunk_size.max(1),
        }
    }

    pub async fn remove_records(
        &self,
        record_ids: &[RecordId],
        authority: &Authority,
    ) -> ReviewResult<RemovalReport> {
        let removing: BTreeSet<RecordId> = record_ids.iter().copied().collect();
        if removing.is_empty() {
            return Ok(RemovalReport::default());
        }

        let mut doomed: Vec<RecordId> = Vec::new();
        let mut adoptions: Vec<Adoption> = Vec::new();
        let mut unlist: Vec<(ClusterId, RecordId)> = Vec::new();

        for &record_id in &removing {
            let Some(document) = self.index.get_by_record(record_id).await? else {
                debug!(record_id, "No index document, relational cleanup only");
                continue;
            };

            match (document.cluster_id, document.parent()) {
                (Some(cluster_id), None) => {
                    let survivors = self.surviving_members(&document, cluster_id, &removing).await?;
                    if let Some(adoption) = self.plan_adoption(document, survivors).await? {
                        adoptions.push(adoption);
                    }
                    doomed.push(record_id);
                }
                (_, Some(parent)) => {
                    let root_removed = match self.index.get_by_cluster(parent).await? {
                        Some(root) => removing.contains(&root.record_id),
                        None => true,
                    };
                    if root_removed {
                        debug!(record_id, parent, "Root also withdrawn, skipping unlist");
                    } else {
                        unlist.push((parent, record_id));
                    }
                    doomed.push(record_id);
                }
                (None, None) => {
                    warn!(record_id, "Root document without cluster id");
                    doomed.push(record_id);
                }
            }
        }

        let mut tx = begin_monitored(&self.db, "removal::remove_records").await?;
        let conn = tx.conn()?;

        let mut plan = Vec::new();
        let mut promotions = Vec::with_capacity(adoptions.len());
        for adoption in adoptions {
            let index_max = self.index.max_cluster_id().await?;
            let cluster_id = cluster_counter::allocate(conn, index_max).await?;
            promotions.push(promotion_steps(adoption, cluster_id, &mut plan));
        }
        plan.extend(
            unlist
                .into_iter()
                .map(|(cluster_id, record_id)| MergeStep::Unlist { cluster_id, record_id }),
        );
        plan.extend(doomed.chunks(self.bulk_chunk_size).map(|chunk| MergeStep::Delete {
            record_ids: chunk.to_vec(),
        }));

        let documents_deleted = match execute_plan(&*self.index, plan).await {
            Ok(deleted) => deleted,
            Err(PlanAbort::Untouched(source)) => return Err(ReviewError::StoreUnavailable(source)),
            Err(PlanAbort::Partial {
                failed,
                completed,
                pending,
                source,
            }) => {
                error!(
                    removing = removing.len(),
                    failed = ?failed,
                    completed = completed.len(),
                    pending = pending.len(),
                    error = %source,
                    "Removal aborted part way; index needs repair"
                );
                return Err(ReviewError::PartialRemoval {
                    failed,
                    completed,
                    pending,
                    source,
                });
            }
        };

        for &record_id in &removing {
            db::records::set_indexed(conn, record_id, false).await?;
            db::review_status::clear(conn, record_id, authority).await?;
            db::hits::delete_for_record(conn, record_id, authority).await?;
        }

        tx.commit().await?;

        info!(
            authority = %authority,
            removed = removing.len(),
            documents_deleted,
            promotions = promotions.len(),
            "Records removed"
        );

        let report = RemovalReport {
            removed: removing.len(),
            documents_deleted,
            promotions,
        };
        self.event_bus.emit_lossy(GazEvent::RecordsRemoved {
            authority: authority.to_string(),
            removed: report.removed,
            documents_deleted: report.documents_deleted,
            promotions: report.promotions.clone(),
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    /// Member documents of a root not in the removal set, listed or not
    async fn surviving_members(
        &self,
        root: &ClusterDocument,
        cluster_id: ClusterId,
        removing: &BTreeSet<RecordId>,
    ) -> ReviewResult<Vec<ClusterDocument>> {
        let mut seen: HashSet<RecordId> = HashSet::new();
        let mut survivors = Vec::new();

        for member in self.index.members_of(cluster_id).await? {
            if member.record_id != root.record_id
                && !removing.contains(&member.record_id)
                && seen.insert(member.record_id)
            {
                survivors.push(member);
            }
        }
        for &child in &root.children {
            if removing.contains(&child) || !seen.insert(child) {
                continue;
            }
            match self.index.get_by_record(child).await? {
                Some(document) => survivors.push(document),
                None => warn!(record_id = child, cluster_id, "Listed child has no document"),
            }
        }

        Ok(survivors)
    }

    /// Pick the heir among the survivors; `None` when nothing survives
    async fn plan_adoption(
        &self,
        old_root: ClusterDocument,
        mut survivors: Vec<ClusterDocument>,
    ) -> ReviewResult<Option<Adoption>> {
        if survivors.is_empty() {
            return Ok(None);
        }

        let ids: Vec<RecordId> = survivors.iter().map(|d| d.record_id).collect();
        let mut conn = self.db.acquire().await?;
        let links: HashMap<RecordId, i64> = db::records::link_counts(&mut conn, &ids).await?;

        survivors.sort_by_key(|d| (Reverse(links.get(&d.record_id).copied().unwrap_or(0)), d.record_id));
        let heir = survivors.remove(0);

        Ok(Some(Adoption {
            old_root,
            heir,
            siblings: survivors,
        }))
    }
}

/// Queue the hand-over of `adoption` to a fresh cluster: new root first, then
/// one re-point per sibling
fn promotion_steps(adoption: Adoption, cluster_id: ClusterId, plan: &mut Vec<MergeStep>) -> RootPromotion {
    let Adoption {
        old_root,
        heir,
        siblings,
    } = adoption;

    let mut root = ClusterDocument::root(
        heir.record_id,
        heir.dataset.clone(),
        heir.title.clone(),
        cluster_id,
        heir.names.clone(),
    );
    root.children = siblings.iter().map(|d| d.record_id).collect();
    root.suggest = merge_names(&heir.names, siblings.iter().flat_map(|d| d.names.iter()));
    plan.push(MergeStep::Promote { document: root });
    plan.extend(siblings.iter().map(|sibling| MergeStep::Repoint {
        record_id: sibling.record_id,
        parent: cluster_id,
    }));

    debug!(
        old_root = old_root.record_id,
        new_root = heir.record_id,
        cluster_id,
        adopted = siblings.len(),
        "Planned root hand-over"
    );

    RootPromotion {
        old_root: old_root.record_id,
        new_root: heir.record_id,
        cluster_id,
        adopted: siblings.iter().map(|d| d.record_id).collect(),
    }
}
