//! Database schema migrations
//!
//! Versioned, idempotent upgrades for databases created by older ingest
//! releases. Migrations are tracked in `schema_version`.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - they must stay stable for users upgrading
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Use ALTER TABLE** - prefer it over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = sqlx::query_scalar(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1"
    )
    .fetch_optional(pool)
    .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: `places.indexed`
///
/// Ingest releases before index consolidation created places without the flag.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Add indexed column to places");
    add_column_if_missing(pool, "places", "indexed", "INTEGER NOT NULL DEFAULT 0").await
}

/// Migration v2: `task_id` on every fact table
///
/// Needed so that review batches can be undone by batch id.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Add task_id to fact tables");
    for table in ["place_names", "place_geoms", "place_links", "place_descriptions"] {
        add_column_if_missing(pool, table, "task_id", "TEXT").await?;
    }
    Ok(())
}

/// Idempotent ALTER TABLE ADD COLUMN
async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    declaration: &str,
) -> Result<()> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)"
    )
    .bind(table)
    .fetch_one(pool)
    .await?;

    if !table_exists {
        info!("  {} table doesn't exist yet - skipping", table);
        return Ok(());
    }

    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?"
    )
    .bind(table)
    .bind(column)
    .fetch_one(pool)
    .await?;

    if has_column > 0 {
        return Ok(());
    }

    match sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, declaration))
        .execute(pool)
        .await
    {
        Ok(_) => {
            info!("  ✓ Added {} column to {} table", column, table);
            Ok(())
        }
        // Another process beat us to it
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => Ok(()),
        Err(e) => Err(e.into()),
    }
}
