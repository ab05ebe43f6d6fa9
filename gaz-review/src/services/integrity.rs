//! Cluster integrity audit
//!
//! Walks every index document of a dataset and reports where the forest is
//! no longer one hop deep and mutually consistent. Read only; repairs are
//! left to an operator.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::error::ReviewResult;
use crate::index::{ClusterDocument, IndexStore};
use crate::models::{ClusterId, RecordId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Member points at a cluster with no root document
    DanglingParent { record_id: RecordId, parent: ClusterId },
    /// Member points at a document that is itself a member
    ParentIsMember {
        record_id: RecordId,
        parent: ClusterId,
        parent_record_id: RecordId,
    },
    /// Root lists a child whose document points elsewhere (or is missing)
    ChildNotPointingBack {
        root_record_id: RecordId,
        cluster_id: ClusterId,
        child: RecordId,
        child_parent: Option<ClusterId>,
    },
    /// Member is absent from its root's children
    MissingFromChildren { record_id: RecordId, parent: ClusterId },
    /// Record listed as a child by more than one root
    MultipleRoots { record_id: RecordId, clusters: Vec<ClusterId> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub dataset: String,
    pub documents: usize,
    pub roots: usize,
    pub members: usize,
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

pub async fn audit_dataset(index: &dyn IndexStore, dataset: &str) -> ReviewResult<IntegrityReport> {
    let documents = index.scan_dataset(dataset).await?;
    let mut report = IntegrityReport {
        dataset: dataset.to_string(),
        documents: documents.len(),
        ..Default::default()
    };

    let mut roots_by_cluster: HashMap<ClusterId, Option<ClusterDocument>> = HashMap::new();
    // Members still carrying a cluster id: demoted roots that kept their id
    let stale_ids: HashMap<ClusterId, RecordId> = documents
        .iter()
        .filter(|d| !d.is_root())
        .filter_map(|d| d.cluster_id.map(|c| (c, d.record_id)))
        .collect();
    let mut listed_by: BTreeMap<RecordId, Vec<ClusterId>> = BTreeMap::new();

    for document in &documents {
        if let Some(parent) = document.parent() {
            report.members += 1;
            if !roots_by_cluster.contains_key(&parent) {
                let root = index.get_by_cluster(parent).await?;
                roots_by_cluster.insert(parent, root);
            }
            match roots_by_cluster.get(&parent).and_then(Option::as_ref) {
                None => match stale_ids.get(&parent) {
                    Some(&parent_record_id) => report.violations.push(Violation::ParentIsMember {
                        record_id: document.record_id,
                        parent,
                        parent_record_id,
                    }),
                    None => report.violations.push(Violation::DanglingParent {
                        record_id: document.record_id,
                        parent,
                    }),
                },
                Some(root) if !root.is_root() => report.violations.push(Violation::ParentIsMember {
                    record_id: document.record_id,
                    parent,
                    parent_record_id: root.record_id,
                }),
                Some(root) if !root.children.contains(&document.record_id) => {
                    report.violations.push(Violation::MissingFromChildren {
                        record_id: document.record_id,
                        parent,
                    })
                }
                Some(_) => {}
            }
            continue;
        }

        report.roots += 1;
        let Some(cluster_id) = document.cluster_id else {
            warn!(record_id = document.record_id, "Root without cluster id");
            continue;
        };
        for &child in &document.children {
            listed_by.entry(child).or_default().push(cluster_id);

            let child_parent = index.get_by_record(child).await?.and_then(|d| d.parent());
            if child_parent != Some(cluster_id) {
                report.violations.push(Violation::ChildNotPointingBack {
                    root_record_id: document.record_id,
                    cluster_id,
                    child,
                    child_parent,
                });
            }
        }
    }

    for (record_id, clusters) in listed_by {
        if clusters.len() > 1 {
            report.violations.push(Violation::MultipleRoots { record_id, clusters });
        }
    }

    info!(
        dataset,
        documents = report.documents,
        violations = report.violations.len(),
        "Integrity audit finished"
    );

    Ok(report)
}
