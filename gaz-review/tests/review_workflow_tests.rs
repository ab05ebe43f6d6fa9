//! Review workflow: pass order, decisions, deferral, undo

mod helpers;

use gaz_common::events::{EventBus, GazEvent, ReviewOutcomeKind};
use gaz_review::db;
use gaz_review::index::{IndexStore, MemoryIndex};
use gaz_review::models::{
    AugmentOptions, Authority, CandidateGeometry, CandidatePayload, Decision, DecisionBatch, Pass,
    ReviewStatus, Verdict,
};
use gaz_review::services::{
    audit_dataset, augmentation_writer, ConsolidationOutcome, DecisionProcessor, NextUnit,
    PassController, PassPosition, UndoHandler,
};
use gaz_review::ReviewError;
use helpers::*;
use serde_json::json;
use std::sync::Arc;

const NAMES_SQL: &str = "SELECT COUNT(*) FROM place_names WHERE place_id = ?";
const GEOMS_SQL: &str = "SELECT COUNT(*) FROM place_geoms WHERE place_id = ?";
const LINKS_SQL: &str = "SELECT COUNT(*) FROM place_links WHERE place_id = ?";
const OPEN_HITS_SQL: &str = "SELECT COUNT(*) FROM hits WHERE place_id = ? AND reviewed = 0";

fn athens_payload() -> CandidatePayload {
    let mut payload = names(&["Athens", "Athína"]);
    payload.geometries.push(CandidateGeometry {
        geom_type: "Point".to_string(),
        coordinates: json!([23.7275, 37.9838]),
    });
    payload
}

fn batch(db: &TestDb, record_id: i64, authority: &str, pass: Pass, decisions: &[(i64, Verdict)]) -> DecisionBatch {
    DecisionBatch {
        dataset_id: db.dataset_id,
        record_id,
        authority: Authority::new(authority),
        pass,
        decisions: decisions
            .iter()
            .map(|&(hit_id, verdict)| Decision { hit_id, verdict })
            .collect(),
        options: AugmentOptions::default(),
        reviewer: Some("editor".to_string()),
    }
}

fn processor(db: &TestDb, index: Arc<dyn IndexStore>, bus: &EventBus) -> DecisionProcessor {
    DecisionProcessor::new(db.pool.clone(), index, bus.clone(), Authority::new(CANONICAL))
}

async fn status(db: &TestDb, record_id: i64, authority: &str) -> Option<ReviewStatus> {
    let mut conn = db.pool.acquire().await.unwrap();
    db::review_status::get_status(&mut conn, record_id, &Authority::new(authority))
        .await
        .unwrap()
}

/// Record 1 with one wikidata hit in pass0; returns the hit id
async fn athens_with_hit(db: &TestDb) -> i64 {
    db.place(1, "Athenae").await;
    let ids = db::hits::insert_hits(
        &db.pool,
        &[new_hit(1, db.dataset_id, "task-1", WIKIDATA, "Q1524", Pass::Pass0, athens_payload())],
    )
    .await
    .unwrap();
    ids[0]
}

#[tokio::test]
async fn test_passes_served_in_order() {
    let db = TestDb::new().await;
    db.place(1, "Athenae").await;
    db.place(2, "Corinthus").await;
    let ids = db::hits::insert_hits(
        &db.pool,
        &[
            new_hit(1, db.dataset_id, "task-1", WIKIDATA, "Q1524", Pass::Pass1, names(&["Athens"])),
            new_hit(2, db.dataset_id, "task-1", WIKIDATA, "Q170521", Pass::Pass0, names(&["Corinth"])),
        ],
    )
    .await
    .unwrap();

    let controller = PassController::new(db.pool.clone());
    let wd = Authority::new(WIKIDATA);

    assert_eq!(controller.current_pass(db.dataset_id, &wd).await.unwrap(), PassPosition::Pass(Pass::Pass0));
    match controller.next_unit(db.dataset_id, &wd, Pass::Pass0).await.unwrap() {
        NextUnit::Record(unit) => {
            assert_eq!(unit.record.id, 2);
            assert_eq!(unit.hits.len(), 1);
        }
        other => panic!("expected record 2, got {:?}", other),
    }

    let bus = EventBus::new(16);
    processor(&db, Arc::new(MemoryIndex::new()), &bus)
        .apply(&batch(&db, 2, WIKIDATA, Pass::Pass0, &[(ids[1], Verdict::NoMatch)]))
        .await
        .unwrap();

    assert_eq!(controller.current_pass(db.dataset_id, &wd).await.unwrap(), PassPosition::Pass(Pass::Pass1));
    assert!(matches!(
        controller.next_unit(db.dataset_id, &wd, Pass::Pass0).await.unwrap(),
        NextUnit::PassExhausted { next: Some(Pass::Pass1) }
    ));

    let progress = controller.progress(db.dataset_id, &wd).await.unwrap();
    assert_eq!(progress.passes[0].records_remaining, 0);
    assert_eq!(progress.passes[1].records_remaining, 1);
    assert_eq!(progress.statuses.reviewed, 1);
    assert_eq!(progress.statuses.unreviewed, 1);
}

#[tokio::test]
async fn test_accepted_hit_augments_record() {
    let db = TestDb::new().await;
    let hit_id = athens_with_hit(&db).await;
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let outcome = processor(&db, Arc::new(MemoryIndex::new()), &bus)
        .apply(&batch(&db, 1, WIKIDATA, Pass::Pass0, &[(hit_id, Verdict::CloseMatch)]))
        .await
        .unwrap();

    assert_eq!(outcome.status, ReviewStatus::Reviewed);
    assert_eq!(outcome.hits_reviewed, 1);
    assert_eq!(outcome.augmented[0].names, 2);
    assert_eq!(outcome.augmented[0].geometries, 1);
    assert!(outcome.augmented[0].link_added);
    assert!(outcome.consolidation.is_none());

    assert_eq!(db.count(NAMES_SQL, 1).await, 3);
    assert_eq!(db.count(GEOMS_SQL, 1).await, 1);
    assert_eq!(db.count(LINKS_SQL, 1).await, 1);
    assert_eq!(db.count(OPEN_HITS_SQL, 1).await, 0);
    assert_eq!(db.dataset_counters().await, (1, 1));
    assert_eq!(status(&db, 1, WIKIDATA).await, Some(ReviewStatus::Reviewed));

    match rx.try_recv().unwrap() {
        GazEvent::DecisionApplied { record_id, outcome, task_ids, .. } => {
            assert_eq!(record_id, 1);
            assert_eq!(outcome, ReviewOutcomeKind::Reviewed);
            assert_eq!(task_ids, vec!["task-1".to_string()]);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_second_batch_for_same_record_is_stale() {
    let db = TestDb::new().await;
    let hit_id = athens_with_hit(&db).await;
    let bus = EventBus::new(16);
    let processor = processor(&db, Arc::new(MemoryIndex::new()), &bus);
    let decisions = batch(&db, 1, WIKIDATA, Pass::Pass0, &[(hit_id, Verdict::CloseMatch)]);

    processor.apply(&decisions).await.unwrap();
    let err = processor.apply(&decisions).await.unwrap_err();

    assert!(matches!(err, ReviewError::StaleState { record_id: 1, .. }));
    assert_eq!(db.count(NAMES_SQL, 1).await, 3);
    assert_eq!(db.count(LINKS_SQL, 1).await, 1);
    assert_eq!(db.dataset_counters().await, (1, 1));
}

#[tokio::test]
async fn test_concurrent_batches_one_wins() {
    let db = TestDb::new().await;
    let hit_id = athens_with_hit(&db).await;
    let bus = EventBus::new(16);
    let index: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let first = processor(&db, index.clone(), &bus);
    let second = processor(&db, index, &bus);
    let decisions = batch(&db, 1, WIKIDATA, Pass::Pass0, &[(hit_id, Verdict::CloseMatch)]);

    let (a, b) = tokio::join!(first.apply(&decisions), second.apply(&decisions));

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = a.err().or(b.err()).unwrap();
    assert!(matches!(loser, ReviewError::StaleState { .. }), "{:?}", loser);
    assert_eq!(db.count(LINKS_SQL, 1).await, 1);
}

#[tokio::test]
async fn test_augmentation_is_idempotent_per_task() {
    let db = TestDb::new().await;
    let hit_id = athens_with_hit(&db).await;
    let record = db.record(1).await;

    let mut conn = db.pool.acquire().await.unwrap();
    let hit = db::hits::get_hit(&mut conn, hit_id).await.unwrap().unwrap();

    let first = augmentation_writer::augment(&mut conn, &record, &hit, "closeMatch", AugmentOptions::default())
        .await
        .unwrap();
    let second = augmentation_writer::augment(&mut conn, &record, &hit, "closeMatch", AugmentOptions::default())
        .await
        .unwrap();
    drop(conn);

    assert_eq!(first.names, 2);
    assert_eq!(second.names, 0);
    assert_eq!(second.geometries, 0);
    assert!(!second.link_added);
    assert_eq!(db.count(NAMES_SQL, 1).await, 3);
    assert_eq!(db.count(LINKS_SQL, 1).await, 1);
    assert_eq!(db.dataset_counters().await, (1, 1));
}

#[tokio::test]
async fn test_invalid_payload_writes_nothing() {
    let db = TestDb::new().await;
    db.place(1, "Athenae").await;
    let mut payload = names(&["Athens"]);
    payload.geometries.push(CandidateGeometry {
        geom_type: "Blob".to_string(),
        coordinates: json!([0, 0]),
    });
    let ids = db::hits::insert_hits(
        &db.pool,
        &[new_hit(1, db.dataset_id, "task-1", WIKIDATA, "Q1524", Pass::Pass0, payload)],
    )
    .await
    .unwrap();

    let bus = EventBus::new(16);
    let err = processor(&db, Arc::new(MemoryIndex::new()), &bus)
        .apply(&batch(&db, 1, WIKIDATA, Pass::Pass0, &[(ids[0], Verdict::CloseMatch)]))
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewError::InvalidPayload(_)));
    assert_eq!(status(&db, 1, WIKIDATA).await, Some(ReviewStatus::Unreviewed));
    assert_eq!(db.count(NAMES_SQL, 1).await, 1);
    assert_eq!(db.count(OPEN_HITS_SQL, 1).await, 1);
}

#[tokio::test]
async fn test_all_deferred_batch_moves_record_to_deferred_queue() {
    let db = TestDb::new().await;
    let hit_id = athens_with_hit(&db).await;
    let bus = EventBus::new(16);
    let processor = processor(&db, Arc::new(MemoryIndex::new()), &bus);
    let controller = PassController::new(db.pool.clone());
    let wd = Authority::new(WIKIDATA);

    let outcome = processor
        .apply(&batch(&db, 1, WIKIDATA, Pass::Pass0, &[(hit_id, Verdict::Defer)]))
        .await
        .unwrap();
    assert_eq!(outcome.status, ReviewStatus::Deferred);
    assert_eq!(outcome.hits_deferred, 1);
    assert_eq!(db.count(OPEN_HITS_SQL, 1).await, 1);

    // Pass sequence is finished but the deferred queue is not
    assert_eq!(controller.current_pass(db.dataset_id, &wd).await.unwrap(), PassPosition::Done);
    assert!(matches!(
        controller.next_unit(db.dataset_id, &wd, Pass::Pass0).await.unwrap(),
        NextUnit::PassExhausted { next: Some(Pass::Deferred) }
    ));
    match controller.next_unit(db.dataset_id, &wd, Pass::Deferred).await.unwrap() {
        NextUnit::Record(unit) => {
            assert_eq!(unit.record.id, 1);
            assert_eq!(unit.hits[0].pass, Pass::Deferred);
        }
        other => panic!("expected deferred record, got {:?}", other),
    }

    let outcome = processor
        .apply(&batch(&db, 1, WIKIDATA, Pass::Deferred, &[(hit_id, Verdict::CloseMatch)]))
        .await
        .unwrap();
    assert_eq!(outcome.status, ReviewStatus::Reviewed);
    assert!(matches!(
        controller.next_unit(db.dataset_id, &wd, Pass::Deferred).await.unwrap(),
        NextUnit::NoWork
    ));
}

#[tokio::test]
async fn test_canonical_accept_attaches_record() {
    let db = TestDb::new().await;
    db.place(1, "Athenae").await;
    db.place(110, "Athens").await;
    let index = Arc::new(MemoryIndex::new());
    seed_cluster(&*index, 110, 11, &[]).await;
    let ids = db::hits::insert_hits(&db.pool, &[cluster_hit(1, db.dataset_id, "task-9", 11, 3)])
        .await
        .unwrap();
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let outcome = processor(&db, index.clone(), &bus)
        .apply(&batch(&db, 1, CANONICAL, Pass::Pass0, &[(ids[0], Verdict::ExactMatch)]))
        .await
        .unwrap();

    let report = outcome.consolidation.unwrap();
    assert!(matches!(report.outcome, ConsolidationOutcome::Attached { cluster_id: 11, .. }));
    assert!(outcome.augmented.is_empty());
    assert_eq!(index.get_by_record(1).await.unwrap().unwrap().parent(), Some(11));
    assert!(db.has_edge(1, 110).await);

    assert!(matches!(rx.try_recv().unwrap(), GazEvent::DecisionApplied { .. }));
    assert!(matches!(
        rx.try_recv().unwrap(),
        GazEvent::RecordAttached { record_id: 1, cluster_id: 11, .. }
    ));
}

/// Record 1 plus cluster 10 (root 100, children 20 and 21) and cluster 11 (root 110)
async fn two_clusters(db: &TestDb, index: &dyn IndexStore) {
    for (id, title) in [(1, "Athenae"), (100, "Athina"), (20, "Atene"), (21, "Athen"), (110, "Athens")] {
        db.place(id, title).await;
    }
    seed_cluster(index, 100, 10, &[20, 21]).await;
    seed_cluster(index, 110, 11, &[]).await;
}

async fn edge_provenance(db: &TestDb, a: i64, b: i64) -> (String, Option<String>) {
    sqlx::query_as("SELECT basis, task_id FROM close_matches WHERE place_a = ? AND place_b = ?")
        .bind(a.min(b))
        .bind(a.max(b))
        .fetch_one(&db.pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_canonical_batch_merges_clusters_once() {
    let db = TestDb::new().await;
    let index = Arc::new(MemoryIndex::new());
    two_clusters(&db, &*index).await;
    let ids = db::hits::insert_hits(
        &db.pool,
        &[
            cluster_hit(1, db.dataset_id, "task-9", 10, 2),
            cluster_hit(1, db.dataset_id, "task-9", 11, 7),
        ],
    )
    .await
    .unwrap();
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let outcome = processor(&db, index.clone(), &bus)
        .apply(&batch(
            &db,
            1,
            CANONICAL,
            Pass::Pass0,
            &[(ids[0], Verdict::CloseMatch), (ids[1], Verdict::ExactMatch)],
        ))
        .await
        .unwrap();

    match outcome.consolidation.unwrap().outcome {
        ConsolidationOutcome::Merged {
            winner,
            root_record_id,
            losers,
            reassigned,
        } => {
            assert_eq!(winner, 11);
            assert_eq!(root_record_id, 110);
            assert_eq!(losers, vec![10]);
            assert_eq!(reassigned, vec![20, 21]);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(outcome.hits_reviewed, 2);
    assert_eq!(db.count(OPEN_HITS_SQL, 1).await, 0);
    assert_eq!(status(&db, 1, CANONICAL).await, Some(ReviewStatus::Reviewed));
    assert!(db.record(1).await.indexed);

    assert!(db.has_edge(1, 110).await);
    assert!(db.has_edge(20, 110).await);
    assert!(db.has_edge(21, 110).await);
    assert_eq!(index.get_by_record(100).await.unwrap().unwrap().parent(), Some(11));
    assert!(audit_dataset(&*index, DATASET).await.unwrap().is_clean());

    assert!(matches!(rx.try_recv().unwrap(), GazEvent::DecisionApplied { record_id: 1, .. }));
    assert!(matches!(
        rx.try_recv().unwrap(),
        GazEvent::ClustersMerged { record_id: 1, winner_cluster_id: 11, .. }
    ));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_mixed_task_batch_records_each_task() {
    let db = TestDb::new().await;
    let index = Arc::new(MemoryIndex::new());
    two_clusters(&db, &*index).await;
    let ids = db::hits::insert_hits(
        &db.pool,
        &[
            cluster_hit(1, db.dataset_id, "task-a", 10, 2),
            cluster_hit(1, db.dataset_id, "task-b", 11, 7),
        ],
    )
    .await
    .unwrap();
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    processor(&db, index.clone(), &bus)
        .apply(&batch(
            &db,
            1,
            CANONICAL,
            Pass::Pass0,
            &[(ids[0], Verdict::CloseMatch), (ids[1], Verdict::CloseMatch)],
        ))
        .await
        .unwrap();

    // Record joined cluster 11 on task-b's match; cluster 10's children came via task-a
    assert_eq!(
        edge_provenance(&db, 1, 110).await,
        ("review".to_string(), Some("task-b".to_string()))
    );
    assert_eq!(
        edge_provenance(&db, 20, 110).await,
        ("merge".to_string(), Some("task-a".to_string()))
    );

    match rx.try_recv().unwrap() {
        GazEvent::DecisionApplied { task_ids, .. } => {
            assert_eq!(task_ids, vec!["task-a".to_string(), "task-b".to_string()]);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_canonical_no_match_creates_cluster() {
    let db = TestDb::new().await;
    db.place(1, "Athenae").await;
    let index = Arc::new(MemoryIndex::new());
    let ids = db::hits::insert_hits(&db.pool, &[cluster_hit(1, db.dataset_id, "task-9", 11, 3)])
        .await
        .unwrap();
    let bus = EventBus::new(16);

    let outcome = processor(&db, index.clone(), &bus)
        .apply(&batch(&db, 1, CANONICAL, Pass::Pass0, &[(ids[0], Verdict::NoMatch)]))
        .await
        .unwrap();

    assert!(matches!(
        outcome.consolidation.unwrap().outcome,
        ConsolidationOutcome::Created { cluster_id: 1 }
    ));
    assert!(index.get_by_record(1).await.unwrap().unwrap().is_root());
}

#[tokio::test]
async fn test_index_failure_rolls_back_batch() {
    let db = TestDb::new().await;
    db.place(1, "Athenae").await;
    db.place(110, "Athens").await;
    let memory = MemoryIndex::new();
    seed_cluster(&memory, 110, 11, &[]).await;
    let failing = FailingIndex::new(memory, 1);
    let ids = db::hits::insert_hits(&db.pool, &[cluster_hit(1, db.dataset_id, "task-9", 11, 3)])
        .await
        .unwrap();
    let bus = EventBus::new(16);
    let decisions = batch(&db, 1, CANONICAL, Pass::Pass0, &[(ids[0], Verdict::CloseMatch)]);

    let err = processor(&db, failing.clone(), &bus).apply(&decisions).await.unwrap_err();
    assert!(matches!(err, ReviewError::StoreUnavailable(_)));
    assert_eq!(status(&db, 1, CANONICAL).await, Some(ReviewStatus::Unreviewed));
    assert_eq!(db.count(OPEN_HITS_SQL, 1).await, 1);
    assert!(!db.record(1).await.indexed);
    assert!(!db.has_edge(1, 110).await);

    // Injected failure was one-shot; the retry goes through
    let outcome = processor(&db, failing, &bus).apply(&decisions).await.unwrap();
    assert_eq!(outcome.status, ReviewStatus::Reviewed);
    assert!(db.record(1).await.indexed);
}

#[tokio::test]
async fn test_undo_restores_record() {
    let db = TestDb::new().await;
    let hit_id = athens_with_hit(&db).await;
    let bus = EventBus::new(16);
    processor(&db, Arc::new(MemoryIndex::new()), &bus)
        .apply(&batch(&db, 1, WIKIDATA, Pass::Pass0, &[(hit_id, Verdict::CloseMatch)]))
        .await
        .unwrap();
    let mut rx = bus.subscribe();

    let report = UndoHandler::new(db.pool.clone(), bus.clone(), Authority::new(CANONICAL))
        .undo(1, "task-1", &Authority::new(WIKIDATA))
        .await
        .unwrap();

    assert_eq!(report.facts_removed.names, 2);
    assert_eq!(report.facts_removed.geometries, 1);
    assert_eq!(report.facts_removed.links, 1);
    assert_eq!(report.hits_reset, 1);
    assert_eq!(db.count(NAMES_SQL, 1).await, 1);
    assert_eq!(db.count(LINKS_SQL, 1).await, 0);
    assert_eq!(db.dataset_counters().await, (0, 0));
    assert_eq!(status(&db, 1, WIKIDATA).await, Some(ReviewStatus::Unreviewed));

    let controller = PassController::new(db.pool.clone());
    assert!(matches!(
        controller.next_unit(db.dataset_id, &Authority::new(WIKIDATA), Pass::Pass0).await.unwrap(),
        NextUnit::Record(_)
    ));
    assert!(matches!(rx.try_recv().unwrap(), GazEvent::DecisionUndone { facts_removed: 4, .. }));
}

#[tokio::test]
async fn test_undo_unknown_task_not_found() {
    let db = TestDb::new().await;
    athens_with_hit(&db).await;
    let bus = EventBus::new(16);

    let err = UndoHandler::new(db.pool.clone(), bus, Authority::new(CANONICAL))
        .undo(1, "task-404", &Authority::new(WIKIDATA))
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewError::NotFound(_)));
}

#[tokio::test]
async fn test_canonical_undo_unsupported() {
    let db = TestDb::new().await;
    let bus = EventBus::new(16);

    let err = UndoHandler::new(db.pool.clone(), bus, Authority::new(CANONICAL))
        .undo(1, "task-9", &Authority::new(CANONICAL))
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewError::UndoUnsupported(_)));
}
