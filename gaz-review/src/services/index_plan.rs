//! Ordered index write plans
//!
//! Changes spanning several index documents (cluster merges, root hand-overs,
//! chunked deletes) are planned as a list of [`MergeStep`]s and run one at a
//! time. The index only guarantees per-document atomicity, so a failure part
//! way through is reported with the exact split between applied and pending
//! steps instead of a plain store error.

use serde::Serialize;
use tracing::debug;

use crate::index::{ClusterDocument, IndexError, IndexStore};
use crate::models::{ClusterId, RecordId};

/// One index write of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum MergeStep {
    /// Append member ids and names to a root
    AppendToRoot {
        cluster_id: ClusterId,
        children: Vec<RecordId>,
        names: Vec<String>,
    },
    /// Write the incoming record as a member
    Join { document: ClusterDocument },
    /// Rewrite a losing root as a member of the winner
    Demote { document: ClusterDocument },
    /// Point a member at another cluster
    Repoint { record_id: RecordId, parent: ClusterId },
    /// Write a surviving member as the root of a fresh cluster
    Promote { document: ClusterDocument },
    /// Drop a member id from its root's children; a vanished root is fine
    Unlist { cluster_id: ClusterId, record_id: RecordId },
    /// Delete one chunk of documents
    Delete { record_ids: Vec<RecordId> },
}

/// Why a plan stopped
#[derive(Debug)]
pub(crate) enum PlanAbort {
    /// The first step failed; the index is as it was
    Untouched(IndexError),
    /// Some steps were applied before `failed`
    Partial {
        failed: MergeStep,
        completed: Vec<MergeStep>,
        pending: Vec<MergeStep>,
        source: IndexError,
    },
}

/// Run `plan` in order, stopping at the first failure
///
/// Returns the number of documents removed by `Delete` steps.
pub(crate) async fn execute_plan(
    index: &dyn IndexStore,
    plan: Vec<MergeStep>,
) -> Result<usize, PlanAbort> {
    let mut remaining = plan.into_iter();
    let mut completed = Vec::new();
    let mut deleted = 0;

    while let Some(step) = remaining.next() {
        match run_step(index, &step).await {
            Ok(n) => deleted += n,
            Err(source) if completed.is_empty() => return Err(PlanAbort::Untouched(source)),
            Err(source) => {
                return Err(PlanAbort::Partial {
                    failed: step,
                    completed,
                    pending: remaining.collect(),
                    source,
                })
            }
        }
        completed.push(step);
    }

    Ok(deleted)
}

async fn run_step(index: &dyn IndexStore, step: &MergeStep) -> Result<usize, IndexError> {
    match step {
        MergeStep::AppendToRoot {
            cluster_id,
            children,
            names,
        } => index.append_to_root(*cluster_id, children, names).await.map(|_| 0),
        MergeStep::Join { document }
        | MergeStep::Demote { document }
        | MergeStep::Promote { document } => index.put(document.clone()).await.map(|_| 0),
        MergeStep::Repoint { record_id, parent } => {
            index.set_parent(*record_id, *parent).await.map(|_| 0)
        }
        MergeStep::Unlist {
            cluster_id,
            record_id,
        } => match index.remove_child(*cluster_id, *record_id).await {
            Ok(()) => Ok(0),
            Err(IndexError::Missing(_)) => {
                debug!(cluster_id, record_id, "Root already gone, nothing to unlist");
                Ok(0)
            }
            Err(e) => Err(e),
        },
        MergeStep::Delete { record_ids } => index.bulk_delete(record_ids).await,
    }
}
