//! Shared fixtures for gaz-review integration tests
//!
//! Each test gets its own temp-file SQLite database and in-process index.

#![allow(dead_code)]

use async_trait::async_trait;
use gaz_review::index::{ClusterDocument, IndexError, IndexResult, IndexStore, MemoryIndex};
use gaz_review::models::{
    Authority, CandidateName, CandidatePayload, ClusterId, NewHit, Pass, Record, RecordId,
};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const DATASET: &str = "pleiades";
pub const CANONICAL: &str = "whg";
pub const WIKIDATA: &str = "wd";

/// Temp-dir database; dropped with the test
pub struct TestDb {
    _dir: TempDir,
    pub pool: SqlitePool,
    pub dataset_id: i64,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let pool = gaz_review::db::init_database_pool(&dir.path().join("gaz.db"))
            .await
            .expect("Failed to initialize database");
        let dataset_id = seed_dataset(&pool, DATASET).await;
        Self {
            _dir: dir,
            pool,
            dataset_id,
        }
    }

    /// Insert a place with its own names
    pub async fn place(&self, id: RecordId, title: &str) -> RecordId {
        seed_place(&self.pool, id, self.dataset_id, title).await
    }

    pub async fn record(&self, id: RecordId) -> Record {
        let mut conn = self.pool.acquire().await.unwrap();
        gaz_review::db::records::get_record(&mut conn, id)
            .await
            .unwrap()
            .expect("record seeded")
    }

    pub async fn link(&self, place_id: RecordId, identifier: &str) {
        sqlx::query("INSERT INTO place_links (place_id, identifier) VALUES (?, ?)")
            .bind(place_id)
            .bind(identifier)
            .execute(&self.pool)
            .await
            .unwrap();
    }

    pub async fn count(&self, sql: &str, place_id: RecordId) -> i64 {
        sqlx::query_scalar(sql)
            .bind(place_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn dataset_counters(&self) -> (i64, i64) {
        sqlx::query_as("SELECT numlinked, total_links FROM datasets WHERE id = ?")
            .bind(self.dataset_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn has_edge(&self, a: RecordId, b: RecordId) -> bool {
        let mut conn = self.pool.acquire().await.unwrap();
        gaz_review::db::close_matches::has_edge(&mut conn, a, b).await.unwrap()
    }
}

pub async fn seed_dataset(pool: &SqlitePool, label: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO datasets (label, title) VALUES (?, ?) RETURNING id")
        .bind(label)
        .bind(format!("{} gazetteer", label))
        .fetch_one(pool)
        .await
        .expect("Failed to seed dataset")
}

pub async fn seed_place(pool: &SqlitePool, id: RecordId, dataset_id: i64, title: &str) -> RecordId {
    sqlx::query("INSERT INTO places (id, dataset_id, title) VALUES (?, ?, ?)")
        .bind(id)
        .bind(dataset_id)
        .bind(title)
        .execute(pool)
        .await
        .expect("Failed to seed place");
    sqlx::query("INSERT INTO place_names (place_id, toponym) VALUES (?, ?)")
        .bind(id)
        .bind(title)
        .execute(pool)
        .await
        .expect("Failed to seed place name");
    id
}

pub fn names(toponyms: &[&str]) -> CandidatePayload {
    CandidatePayload {
        names: toponyms
            .iter()
            .map(|t| CandidateName {
                toponym: t.to_string(),
                lang: Some("en".to_string()),
            })
            .collect(),
        ..Default::default()
    }
}

pub fn new_hit(
    record_id: RecordId,
    dataset_id: i64,
    task_id: &str,
    authority: &str,
    authrecord_id: &str,
    pass: Pass,
    payload: CandidatePayload,
) -> NewHit {
    NewHit {
        record_id,
        dataset_id,
        task_id: task_id.to_string(),
        authority: Authority::new(authority),
        authrecord_id: authrecord_id.to_string(),
        pass,
        score: 0.9,
        payload,
    }
}

/// Canonical hit pointing at an existing cluster
pub fn cluster_hit(record_id: RecordId, dataset_id: i64, task_id: &str, cluster_id: ClusterId, weight: i64) -> NewHit {
    let payload = CandidatePayload {
        cluster_id: Some(cluster_id),
        weight: Some(weight),
        ..Default::default()
    };
    new_hit(
        record_id,
        dataset_id,
        task_id,
        CANONICAL,
        &format!("c{}", cluster_id),
        Pass::Pass0,
        payload,
    )
}

/// Root `record_id` of `cluster_id` with members `children`, all in the test dataset
pub async fn seed_cluster(
    index: &dyn IndexStore,
    root: RecordId,
    cluster_id: ClusterId,
    children: &[RecordId],
) {
    let mut document = ClusterDocument::root(root, DATASET, format!("Place {}", root), cluster_id, vec![format!("Place {}", root)]);
    document.children = children.to_vec();
    document.suggest.extend(children.iter().map(|c| format!("Place {}", c)));
    index.put(document).await.unwrap();

    for &child in children {
        index
            .put(ClusterDocument::member(
                child,
                DATASET,
                format!("Place {}", child),
                cluster_id,
                vec![format!("Place {}", child)],
            ))
            .await
            .unwrap();
    }
}

/// Index that fails its `fail_on`-th mutating call (1-based; 0 never fails)
pub struct FailingIndex {
    pub inner: MemoryIndex,
    fail_on: usize,
    mutations: AtomicUsize,
}

impl FailingIndex {
    pub fn new(inner: MemoryIndex, fail_on: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_on,
            mutations: AtomicUsize::new(0),
        })
    }

    /// Mutating calls seen so far, the failed one included
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn check(&self) -> IndexResult<()> {
        let n = self.mutations.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(IndexError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexStore for FailingIndex {
    async fn get_by_record(&self, record_id: RecordId) -> IndexResult<Option<ClusterDocument>> {
        self.inner.get_by_record(record_id).await
    }

    async fn get_by_cluster(&self, cluster_id: ClusterId) -> IndexResult<Option<ClusterDocument>> {
        self.inner.get_by_cluster(cluster_id).await
    }

    async fn max_cluster_id(&self) -> IndexResult<Option<ClusterId>> {
        self.inner.max_cluster_id().await
    }

    async fn put(&self, document: ClusterDocument) -> IndexResult<()> {
        self.check()?;
        self.inner.put(document).await
    }

    async fn append_to_root(&self, cluster_id: ClusterId, children: &[RecordId], names: &[String]) -> IndexResult<()> {
        self.check()?;
        self.inner.append_to_root(cluster_id, children, names).await
    }

    async fn remove_child(&self, cluster_id: ClusterId, child: RecordId) -> IndexResult<()> {
        self.check()?;
        self.inner.remove_child(cluster_id, child).await
    }

    async fn set_parent(&self, record_id: RecordId, parent: ClusterId) -> IndexResult<()> {
        self.check()?;
        self.inner.set_parent(record_id, parent).await
    }

    async fn bulk_delete(&self, record_ids: &[RecordId]) -> IndexResult<usize> {
        self.check()?;
        self.inner.bulk_delete(record_ids).await
    }

    async fn scan_dataset(&self, dataset: &str) -> IndexResult<Vec<ClusterDocument>> {
        self.inner.scan_dataset(dataset).await
    }

    async fn members_of(&self, cluster_id: ClusterId) -> IndexResult<Vec<ClusterDocument>> {
        self.inner.members_of(cluster_id).await
    }
}
