//! Database access for gaz-review
//!
//! The core place tables are created by `gaz_common::db`; this module adds
//! the review tables (hits, review status, equivalence ledger, cluster id
//! high-water mark) and the queries the engine runs against them.
//!
//! Functions that may run inside a review transaction take
//! `&mut SqliteConnection` so the caller can pass either a pooled connection
//! or the open transaction.

pub mod close_matches;
pub mod cluster_counter;
pub mod facts;
pub mod hits;
pub mod records;
pub mod review_status;

use gaz_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (or create) the shared database and ensure review tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = gaz_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create gaz-review specific tables (idempotent)
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            place_id INTEGER NOT NULL REFERENCES places(id) ON DELETE CASCADE,
            dataset_id INTEGER NOT NULL,
            task_id TEXT NOT NULL,
            authority TEXT NOT NULL,
            authrecord_id TEXT NOT NULL,
            pass TEXT NOT NULL
                CHECK (pass IN ('pass0', 'pass1', 'pass2', 'pass3', 'deferred')),
            score REAL NOT NULL DEFAULT 0,
            payload TEXT NOT NULL DEFAULT '{}',
            reviewed INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_hits_queue ON hits(dataset_id, authority, pass, reviewed, place_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_hits_place ON hits(place_id, authority, task_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_status (
            place_id INTEGER NOT NULL REFERENCES places(id) ON DELETE CASCADE,
            authority TEXT NOT NULL,
            status TEXT NOT NULL
                CHECK (status IN ('unreviewed', 'reviewed', 'deferred', 'no_hits')),
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (place_id, authority)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Unordered pairs are normalized to place_a < place_b
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS close_matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            place_a INTEGER NOT NULL,
            place_b INTEGER NOT NULL,
            basis TEXT NOT NULL,
            task_id TEXT,
            created_by TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (place_a, place_b),
            CHECK (place_a < place_b)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_close_matches_b ON close_matches(place_b)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cluster_counter (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            value INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Review tables initialized (hits, review_status, close_matches, cluster_counter)");

    Ok(())
}
