//! Tests for database initialization
//!
//! Covers first-run creation, reopening an existing file, default settings
//! and the core place tables the review engine writes into.

use gaz_common::db::init::{get_setting_i64, init_database};
use gaz_common::db::CURRENT_SCHEMA_VERSION;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("sub").join("gaz.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("gaz.db");

    let first = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO datasets (id, label) VALUES (1, 'pleiades')")
        .execute(&first)
        .await
        .unwrap();
    first.close().await;

    let second = init_database(&db_path).await.unwrap();
    let label: String = sqlx::query_scalar("SELECT label FROM datasets WHERE id = 1")
        .fetch_one(&second)
        .await
        .unwrap();
    assert_eq!(label, "pleiades");
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let temp = TempDir::new().unwrap();
    let pool = init_database(&temp.path().join("gaz.db")).await.unwrap();

    assert_eq!(get_setting_i64(&pool, "database_busy_timeout_ms", 0).await.unwrap(), 5000);
    assert_eq!(get_setting_i64(&pool, "review_bulk_chunk_size", 0).await.unwrap(), 300);
    assert_eq!(get_setting_i64(&pool, "no_such_setting", 42).await.unwrap(), 42);
}

#[tokio::test]
async fn test_null_setting_reset_to_default() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("gaz.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'review_bulk_chunk_size'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(get_setting_i64(&pool, "review_bulk_chunk_size", 0).await.unwrap(), 300);
}

#[tokio::test]
async fn test_schema_version_recorded() {
    let temp = TempDir::new().unwrap();
    let pool = init_database(&temp.path().join("gaz.db")).await.unwrap();

    let version: i32 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_place_links_unique_per_identifier() {
    let temp = TempDir::new().unwrap();
    let pool = init_database(&temp.path().join("gaz.db")).await.unwrap();

    sqlx::query("INSERT INTO datasets (id, label) VALUES (1, 'ds')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO places (id, dataset_id, title) VALUES (10, 1, 'Athens')")
        .execute(&pool)
        .await
        .unwrap();

    let insert = "INSERT INTO place_links (place_id, identifier, task_id) VALUES (10, 'wd:Q1524', 't1')";
    sqlx::query(insert).execute(&pool).await.unwrap();
    assert!(sqlx::query(insert).execute(&pool).await.is_err());
}
