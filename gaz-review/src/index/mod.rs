//! Document index adapters
//!
//! The canonical index is a forest of cluster documents. A root document
//! carries the cluster id, the list of member record ids and the merged name
//! list used for search suggestions; a member document only points at its
//! root's cluster id. Parent pointers are exactly one hop deep.
//!
//! Mutations of an existing root are expressed as scripted partial updates
//! (append, remove, re-point) so that concurrent writers never overwrite each
//! other through read-modify-write.

pub mod elastic;
pub mod memory;

pub use elastic::ElasticIndex;
pub use memory::MemoryIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ClusterId, RecordId};

/// Index store errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index unreachable: {0}")]
    Unavailable(String),

    #[error("Index call timed out: {0}")]
    Timeout(String),

    #[error("Index rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed index response: {0}")]
    Malformed(String),

    /// A scripted update addressed a document that does not exist
    #[error("Index document missing: {0}")]
    Missing(String),
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Position of a document in the cluster forest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Relation {
    Parent,
    Child { parent: ClusterId },
}

/// One record's document in the canonical index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDocument {
    pub record_id: RecordId,
    pub dataset: String,
    pub title: String,
    /// Set on roots only
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
    pub relation: Relation,
    /// Member record ids (roots only, never includes the root itself)
    #[serde(default)]
    pub children: Vec<RecordId>,
    /// Merged names of every record in the cluster (roots only)
    #[serde(default)]
    pub suggest: Vec<String>,
    /// The record's own names
    #[serde(default)]
    pub names: Vec<String>,
}

impl ClusterDocument {
    /// New root with no members
    pub fn root(
        record_id: RecordId,
        dataset: impl Into<String>,
        title: impl Into<String>,
        cluster_id: ClusterId,
        names: Vec<String>,
    ) -> Self {
        Self {
            record_id,
            dataset: dataset.into(),
            title: title.into(),
            cluster_id: Some(cluster_id),
            relation: Relation::Parent,
            children: Vec::new(),
            suggest: names.clone(),
            names,
        }
    }

    /// Member of the cluster `parent`
    pub fn member(
        record_id: RecordId,
        dataset: impl Into<String>,
        title: impl Into<String>,
        parent: ClusterId,
        names: Vec<String>,
    ) -> Self {
        Self {
            record_id,
            dataset: dataset.into(),
            title: title.into(),
            cluster_id: None,
            relation: Relation::Child { parent },
            children: Vec::new(),
            suggest: Vec::new(),
            names,
        }
    }

    /// Rewrite this document as a member of `parent`, dropping root-only fields
    pub fn demoted(&self, parent: ClusterId) -> Self {
        Self::member(self.record_id, self.dataset.clone(), self.title.clone(), parent, self.names.clone())
    }

    pub fn is_root(&self) -> bool {
        matches!(self.relation, Relation::Parent)
    }

    pub fn parent(&self) -> Option<ClusterId> {
        match self.relation {
            Relation::Child { parent } => Some(parent),
            Relation::Parent => None,
        }
    }
}

/// Merge name lists preserving first-seen order
pub fn merge_names<'a>(base: &[String], extra: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut merged = base.to_vec();
    for name in extra {
        if !merged.contains(name) {
            merged.push(name.clone());
        }
    }
    merged
}

/// Canonical document index
///
/// Implementations must make each call atomic per document; no
/// multi-document atomicity is assumed by callers.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn get_by_record(&self, record_id: RecordId) -> IndexResult<Option<ClusterDocument>>;

    /// The root document carrying `cluster_id`
    async fn get_by_cluster(&self, cluster_id: ClusterId) -> IndexResult<Option<ClusterDocument>>;

    /// Highest cluster id present in the index
    async fn max_cluster_id(&self) -> IndexResult<Option<ClusterId>>;

    /// Create or replace a document
    async fn put(&self, document: ClusterDocument) -> IndexResult<()>;

    /// Append member ids and names to a root's lists, skipping values already present
    async fn append_to_root(
        &self,
        cluster_id: ClusterId,
        children: &[RecordId],
        names: &[String],
    ) -> IndexResult<()>;

    /// Remove one member id from a root's children
    async fn remove_child(&self, cluster_id: ClusterId, child: RecordId) -> IndexResult<()>;

    /// Point a member at a different root
    async fn set_parent(&self, record_id: RecordId, parent: ClusterId) -> IndexResult<()>;

    /// Delete documents by record id; returns how many existed
    async fn bulk_delete(&self, record_ids: &[RecordId]) -> IndexResult<usize>;

    /// Every document of a dataset, ordered by record id
    async fn scan_dataset(&self, dataset: &str) -> IndexResult<Vec<ClusterDocument>>;

    /// Every document pointing at `cluster_id`, ordered by record id
    async fn members_of(&self, cluster_id: ClusterId) -> IndexResult<Vec<ClusterDocument>>;
}
