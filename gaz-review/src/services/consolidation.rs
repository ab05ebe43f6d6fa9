//! Cluster Consolidation Engine
//!
//! Folds a reviewed record into the canonical index given the canonical
//! matches a reviewer accepted:
//!
//! - no match: the record becomes the root of a new cluster
//! - one match: the record joins that cluster
//! - several matches: the record joins the heaviest cluster (lowest cluster id
//!   on ties) and every other matched cluster is folded into it
//!
//! Index writes are planned as an ordered list of [`MergeStep`]s and executed
//! one at a time. Relational writes (ledger edges, `indexed` flag, cluster id
//! allocation) go through the caller's transaction, so a failed plan leaves
//! the database untouched once the caller rolls back.
//!
//! Ledger edges carry the task of the match that named their cluster.

use serde::Serialize;
use sqlx::SqliteConnection;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::db::close_matches::{self, EdgeProvenance};
use crate::db::{cluster_counter, records};
use crate::error::{ReviewError, ReviewResult};
use crate::index::{ClusterDocument, IndexStore};
use crate::models::{CanonicalMatch, ClusterId, ClusterRef, Record, RecordId};
use crate::services::index_plan::{execute_plan, MergeStep, PlanAbort};

/// What consolidation did to the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsolidationOutcome {
    Created {
        cluster_id: ClusterId,
    },
    Attached {
        cluster_id: ClusterId,
        root_record_id: RecordId,
    },
    Merged {
        winner: ClusterId,
        root_record_id: RecordId,
        losers: Vec<ClusterId>,
        reassigned: Vec<RecordId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidationReport {
    pub record_id: RecordId,
    pub outcome: ConsolidationOutcome,
    /// Matches that no longer resolve to a cluster
    pub dropped: Vec<ClusterRef>,
}

/// A match resolved to its cluster root
#[derive(Debug, Clone)]
struct ResolvedRoot {
    cluster_id: ClusterId,
    root: ClusterDocument,
    weight: i64,
    /// Task of the heaviest match naming this cluster
    task_id: Option<String>,
}

pub struct ConsolidationEngine<'a> {
    index: &'a dyn IndexStore,
}

impl<'a> ConsolidationEngine<'a> {
    pub fn new(index: &'a dyn IndexStore) -> Self {
        Self { index }
    }

    /// Index `record` according to its accepted canonical matches
    pub async fn consolidate(
        &self,
        conn: &mut SqliteConnection,
        record: &Record,
        matches: &[CanonicalMatch],
        provenance: &EdgeProvenance,
    ) -> ReviewResult<ConsolidationReport> {
        if self.index.get_by_record(record.id).await?.is_some() {
            return Err(ReviewError::AlreadyIndexed(record.id));
        }

        let names = records::record_names(conn, record.id).await?;
        let (roots, dropped) = self.resolve_all(record.id, matches).await?;

        let outcome = match roots.as_slice() {
            [] => self.create(conn, record, names).await?,
            [target] => self.attach(conn, record, names, target, provenance).await?,
            [winner, losers @ ..] => {
                self.merge(conn, record, names, winner, losers, provenance)
                    .await?
            }
        };

        records::set_indexed(conn, record.id, true).await?;

        Ok(ConsolidationReport {
            record_id: record.id,
            outcome,
            dropped,
        })
    }

    /// Resolve matches to roots, drop the unresolvable, collapse duplicates
    ///
    /// Returned roots are ordered winner first: weight descending, then
    /// cluster id ascending.
    async fn resolve_all(
        &self,
        record_id: RecordId,
        matches: &[CanonicalMatch],
    ) -> ReviewResult<(Vec<ResolvedRoot>, Vec<ClusterRef>)> {
        let mut by_cluster: BTreeMap<ClusterId, ResolvedRoot> = BTreeMap::new();
        let mut dropped = Vec::new();

        for m in matches {
            let Some(root) = self.resolve(m.target).await? else {
                warn!(
                    record_id,
                    target = %m.target,
                    "{}; match dropped",
                    ReviewError::UnresolvedReference(m.target)
                );
                dropped.push(m.target);
                continue;
            };
            let Some(cluster_id) = root.cluster_id else {
                warn!(record_id, root = root.record_id, "Root document without cluster id; match dropped");
                dropped.push(m.target);
                continue;
            };

            let entry = by_cluster.entry(cluster_id).or_insert_with(|| ResolvedRoot {
                cluster_id,
                root: root.clone(),
                weight: m.weight,
                task_id: m.task_id.clone(),
            });
            if m.weight > entry.weight {
                entry.weight = m.weight;
                entry.task_id = m.task_id.clone();
            }
        }

        let mut roots: Vec<ResolvedRoot> = by_cluster.into_values().collect();
        roots.sort_by_key(|r| (Reverse(r.weight), r.cluster_id));
        Ok((roots, dropped))
    }

    /// Follow at most one parent hop to the cluster root
    async fn resolve(&self, target: ClusterRef) -> ReviewResult<Option<ClusterDocument>> {
        let document = match target {
            ClusterRef::Cluster(cluster_id) => self.index.get_by_cluster(cluster_id).await?,
            ClusterRef::Record(record_id) => self.index.get_by_record(record_id).await?,
        };

        match document {
            None => Ok(None),
            Some(doc) if doc.is_root() => Ok(Some(doc)),
            Some(doc) => match doc.parent() {
                Some(parent) => Ok(self
                    .index
                    .get_by_cluster(parent)
                    .await?
                    .filter(|root| root.is_root())),
                None => Ok(None),
            },
        }
    }

    async fn create(
        &self,
        conn: &mut SqliteConnection,
        record: &Record,
        names: Vec<String>,
    ) -> ReviewResult<ConsolidationOutcome> {
        let index_max = self.index.max_cluster_id().await?;
        let cluster_id = cluster_counter::allocate(conn, index_max).await?;

        self.index
            .put(ClusterDocument::root(
                record.id,
                record.dataset.clone(),
                record.title.clone(),
                cluster_id,
                names,
            ))
            .await?;

        info!(record_id = record.id, cluster_id, "Record promoted to new cluster root");
        Ok(ConsolidationOutcome::Created { cluster_id })
    }

    async fn attach(
        &self,
        conn: &mut SqliteConnection,
        record: &Record,
        names: Vec<String>,
        target: &ResolvedRoot,
        provenance: &EdgeProvenance,
    ) -> ReviewResult<ConsolidationOutcome> {
        let plan = join_steps(record, names, target.cluster_id);
        self.execute(record.id, plan).await?;

        close_matches::add_edge(
            conn,
            record.id,
            target.root.record_id,
            &provenance.for_task(target.task_id.as_deref()),
        )
        .await?;

        info!(
            record_id = record.id,
            cluster_id = target.cluster_id,
            root_record_id = target.root.record_id,
            "Record attached to cluster"
        );
        Ok(ConsolidationOutcome::Attached {
            cluster_id: target.cluster_id,
            root_record_id: target.root.record_id,
        })
    }

    async fn merge(
        &self,
        conn: &mut SqliteConnection,
        record: &Record,
        names: Vec<String>,
        winner: &ResolvedRoot,
        losers: &[ResolvedRoot],
        provenance: &EdgeProvenance,
    ) -> ReviewResult<ConsolidationOutcome> {
        let mut plan = join_steps(record, names, winner.cluster_id);
        let mut reassigned = Vec::new();
        let mut reassigned_tasks: Vec<Option<&str>> = Vec::new();
        let mut loser_ids = Vec::new();

        for loser in losers {
            if loser.cluster_id == winner.cluster_id {
                continue;
            }

            // Listed children plus anything pointing at the loser but missing from its list
            let mut children = loser.root.children.clone();
            for member in self.index.members_of(loser.cluster_id).await? {
                if !children.contains(&member.record_id) {
                    children.push(member.record_id);
                }
            }
            children.retain(|c| *c != loser.root.record_id && *c != record.id);

            let mut appended = vec![loser.root.record_id];
            appended.extend(children.iter().copied());

            plan.push(MergeStep::AppendToRoot {
                cluster_id: winner.cluster_id,
                children: appended,
                names: loser.root.suggest.clone(),
            });
            plan.push(MergeStep::Demote {
                document: loser.root.demoted(winner.cluster_id),
            });
            for child in &children {
                plan.push(MergeStep::Repoint {
                    record_id: *child,
                    parent: winner.cluster_id,
                });
            }

            loser_ids.push(loser.cluster_id);
            reassigned_tasks.extend(children.iter().map(|_| loser.task_id.as_deref()));
            reassigned.extend(children);
        }

        self.execute(record.id, plan).await?;

        let winner_root = winner.root.record_id;
        close_matches::add_edge(
            conn,
            record.id,
            winner_root,
            &provenance.for_task(winner.task_id.as_deref()),
        )
        .await?;
        for (child, task_id) in reassigned.iter().zip(reassigned_tasks) {
            let merge_provenance = provenance.for_task(task_id).as_merge();
            close_matches::add_edge(conn, *child, winner_root, &merge_provenance).await?;
        }

        info!(
            record_id = record.id,
            winner = winner.cluster_id,
            losers = ?loser_ids,
            reassigned = reassigned.len(),
            "Clusters merged"
        );
        Ok(ConsolidationOutcome::Merged {
            winner: winner.cluster_id,
            root_record_id: winner_root,
            losers: loser_ids,
            reassigned,
        })
    }

    /// Run a plan; `StoreUnavailable` if nothing was applied, else `PartialMerge`
    async fn execute(&self, record_id: RecordId, plan: Vec<MergeStep>) -> ReviewResult<()> {
        match execute_plan(self.index, plan).await {
            Ok(_) => Ok(()),
            Err(PlanAbort::Untouched(source)) => Err(ReviewError::StoreUnavailable(source)),
            Err(PlanAbort::Partial {
                failed,
                completed,
                pending,
                source,
            }) => {
                error!(
                    record_id,
                    failed = ?failed,
                    completed = completed.len(),
                    pending = pending.len(),
                    error = %source,
                    "Merge aborted part way; index needs repair"
                );
                Err(ReviewError::PartialMerge {
                    failed,
                    completed,
                    pending,
                    source,
                })
            }
        }
    }
}

/// Steps that make `record` a member of `cluster_id`: append first, then write the member
fn join_steps(record: &Record, names: Vec<String>, cluster_id: ClusterId) -> Vec<MergeStep> {
    vec![
        MergeStep::AppendToRoot {
            cluster_id,
            children: vec![record.id],
            names: names.clone(),
        },
        MergeStep::Join {
            document: ClusterDocument::member(
                record.id,
                record.dataset.clone(),
                record.title.clone(),
                cluster_id,
                names,
            ),
        },
    ]
}
