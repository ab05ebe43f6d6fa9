//! Persisted cluster id high-water mark
//!
//! Cluster ids are allocated as `max(highest id in the index, high-water) + 1`.
//! The high-water mark survives deletion of the highest cluster from the
//! index, so ids are never handed out twice.

use gaz_common::Result;
use sqlx::SqliteConnection;

use crate::models::ClusterId;

/// Allocate the next cluster id given the highest id currently in the index
///
/// A single upsert, so two allocations inside competing transactions can
/// never return the same value.
pub async fn allocate(conn: &mut SqliteConnection, index_max: Option<ClusterId>) -> Result<ClusterId> {
    let floor = index_max.unwrap_or(0).max(0);

    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO cluster_counter (id, value) VALUES (1, ? + 1)
        ON CONFLICT(id) DO UPDATE SET value = MAX(cluster_counter.value + 1, excluded.value)
        RETURNING value
        "#,
    )
    .bind(floor)
    .fetch_one(conn)
    .await?;

    tracing::debug!(cluster_id = value, index_max = floor, "Allocated cluster id");

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Highest id ever allocated, if any
    async fn high_water(conn: &mut SqliteConnection) -> Result<Option<ClusterId>> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM cluster_counter WHERE id = 1")
            .fetch_optional(conn)
            .await?;
        Ok(value)
    }

    #[tokio::test]
    async fn test_allocation_is_monotonic_past_index_max() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE cluster_counter (id INTEGER PRIMARY KEY CHECK (id = 1), value INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();

        assert_eq!(high_water(&mut conn).await.unwrap(), None);
        assert_eq!(allocate(&mut conn, Some(11)).await.unwrap(), 12);
        // Index max dropped (highest cluster deleted): the high-water mark wins
        assert_eq!(allocate(&mut conn, Some(5)).await.unwrap(), 13);
        assert_eq!(allocate(&mut conn, None).await.unwrap(), 14);
        // Index moved ahead (written by another tool): jump past it
        assert_eq!(allocate(&mut conn, Some(40)).await.unwrap(), 41);
        assert_eq!(high_water(&mut conn).await.unwrap(), Some(41));
    }
}
