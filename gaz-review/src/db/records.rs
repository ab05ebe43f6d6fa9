//! Place record queries

use gaz_common::Result;
use sqlx::SqliteConnection;
use std::collections::HashMap;

use crate::models::{Record, RecordId};

/// Load a record with its dataset label
pub async fn get_record(conn: &mut SqliteConnection, record_id: RecordId) -> Result<Option<Record>> {
    let record = sqlx::query_as::<_, Record>(
        r#"
        SELECT p.id, p.dataset_id, d.label AS dataset, p.title, p.indexed
        FROM places p
        JOIN datasets d ON d.id = p.dataset_id
        WHERE p.id = ?
        "#,
    )
    .bind(record_id)
    .fetch_optional(conn)
    .await?;

    Ok(record)
}

/// Distinct toponyms attached to a record, falling back to its title
pub async fn record_names(conn: &mut SqliteConnection, record_id: RecordId) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT toponym FROM place_names
        WHERE place_id = ?
        GROUP BY toponym
        ORDER BY MIN(id)
        "#,
    )
    .bind(record_id)
    .fetch_all(&mut *conn)
    .await?;

    if !rows.is_empty() {
        return Ok(rows.into_iter().map(|(name,)| name).collect());
    }

    let title: Option<String> = sqlx::query_scalar("SELECT title FROM places WHERE id = ?")
        .bind(record_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(title.into_iter().collect())
}

pub async fn set_indexed(conn: &mut SqliteConnection, record_id: RecordId, indexed: bool) -> Result<()> {
    sqlx::query("UPDATE places SET indexed = ? WHERE id = ?")
        .bind(indexed)
        .bind(record_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Number of link facts per record; records without links map to 0
pub async fn link_counts(
    conn: &mut SqliteConnection,
    record_ids: &[RecordId],
) -> Result<HashMap<RecordId, i64>> {
    let mut counts = HashMap::with_capacity(record_ids.len());
    for &record_id in record_ids {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM place_links WHERE place_id = ?")
            .bind(record_id)
            .fetch_one(&mut *conn)
            .await?;
        counts.insert(record_id, count);
    }
    Ok(counts)
}
