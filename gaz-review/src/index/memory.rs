//! In-process index
//!
//! Used when no search cluster is configured and by the test suite. Every
//! call takes the write lock once, which gives the same per-document
//! atomicity the scripted updates of the HTTP adapter provide.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{merge_names, ClusterDocument, IndexError, IndexResult, IndexStore, Relation};
use crate::models::{ClusterId, RecordId};

#[derive(Default)]
pub struct MemoryIndex {
    documents: RwLock<BTreeMap<RecordId, ClusterDocument>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every document, ordered by record id
    pub async fn documents(&self) -> Vec<ClusterDocument> {
        self.documents.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

fn root_mut(
    documents: &mut BTreeMap<RecordId, ClusterDocument>,
    cluster_id: ClusterId,
) -> IndexResult<&mut ClusterDocument> {
    documents
        .values_mut()
        .find(|d| d.is_root() && d.cluster_id == Some(cluster_id))
        .ok_or_else(|| IndexError::Missing(format!("root of cluster {}", cluster_id)))
}

#[async_trait]
impl IndexStore for MemoryIndex {
    async fn get_by_record(&self, record_id: RecordId) -> IndexResult<Option<ClusterDocument>> {
        Ok(self.documents.read().await.get(&record_id).cloned())
    }

    async fn get_by_cluster(&self, cluster_id: ClusterId) -> IndexResult<Option<ClusterDocument>> {
        Ok(self
            .documents
            .read()
            .await
            .values()
            .find(|d| d.is_root() && d.cluster_id == Some(cluster_id))
            .cloned())
    }

    async fn max_cluster_id(&self) -> IndexResult<Option<ClusterId>> {
        Ok(self
            .documents
            .read()
            .await
            .values()
            .filter_map(|d| d.cluster_id)
            .max())
    }

    async fn put(&self, document: ClusterDocument) -> IndexResult<()> {
        self.documents.write().await.insert(document.record_id, document);
        Ok(())
    }

    async fn append_to_root(
        &self,
        cluster_id: ClusterId,
        children: &[RecordId],
        names: &[String],
    ) -> IndexResult<()> {
        let mut documents = self.documents.write().await;
        let root = root_mut(&mut documents, cluster_id)?;
        for child in children {
            if *child != root.record_id && !root.children.contains(child) {
                root.children.push(*child);
            }
        }
        root.suggest = merge_names(&root.suggest, names);
        Ok(())
    }

    async fn remove_child(&self, cluster_id: ClusterId, child: RecordId) -> IndexResult<()> {
        let mut documents = self.documents.write().await;
        let root = root_mut(&mut documents, cluster_id)?;
        root.children.retain(|c| *c != child);
        Ok(())
    }

    async fn set_parent(&self, record_id: RecordId, parent: ClusterId) -> IndexResult<()> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&record_id)
            .ok_or_else(|| IndexError::Missing(format!("record {}", record_id)))?;
        document.relation = Relation::Child { parent };
        document.cluster_id = None;
        Ok(())
    }

    async fn bulk_delete(&self, record_ids: &[RecordId]) -> IndexResult<usize> {
        let mut documents = self.documents.write().await;
        Ok(record_ids
            .iter()
            .filter(|id| documents.remove(*id).is_some())
            .count())
    }

    async fn scan_dataset(&self, dataset: &str) -> IndexResult<Vec<ClusterDocument>> {
        Ok(self
            .documents
            .read()
            .await
            .values()
            .filter(|d| d.dataset == dataset)
            .cloned()
            .collect())
    }

    async fn members_of(&self, cluster_id: ClusterId) -> IndexResult<Vec<ClusterDocument>> {
        Ok(self
            .documents
            .read()
            .await
            .values()
            .filter(|d| d.parent() == Some(cluster_id))
            .cloned()
            .collect())
    }
}
