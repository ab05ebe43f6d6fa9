//! Per record × authority review status

use gaz_common::{Error, Result};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{Authority, RecordId, ReviewStatus};

pub async fn get_status(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    authority: &Authority,
) -> Result<Option<ReviewStatus>> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM review_status WHERE place_id = ? AND authority = ?")
            .bind(record_id)
            .bind(authority.as_str())
            .fetch_optional(conn)
            .await?;

    status
        .map(|s| s.parse::<ReviewStatus>().map_err(Error::Internal))
        .transpose()
}

/// Conditional transition `expected → target`
///
/// Returns false when the row did not hold `expected`; the caller lost a race.
pub async fn transition(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    authority: &Authority,
    expected: ReviewStatus,
    target: ReviewStatus,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE review_status
        SET status = ?, updated_at = CURRENT_TIMESTAMP
        WHERE place_id = ? AND authority = ? AND status = ?
        "#,
    )
    .bind(target.as_str())
    .bind(record_id)
    .bind(authority.as_str())
    .bind(expected.as_str())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Unconditional upsert
pub async fn set_status(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    authority: &Authority,
    status: ReviewStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO review_status (place_id, authority, status) VALUES (?, ?, ?)
        ON CONFLICT(place_id, authority)
        DO UPDATE SET status = excluded.status, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(record_id)
    .bind(authority.as_str())
    .bind(status.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

/// Queue a record for review after new hits arrived
pub async fn reopen(conn: &mut SqliteConnection, record_id: RecordId, authority: &Authority) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO review_status (place_id, authority, status) VALUES (?, ?, 'unreviewed')
        ON CONFLICT(place_id, authority)
        DO UPDATE SET status = 'unreviewed', updated_at = CURRENT_TIMESTAMP
        WHERE review_status.status IN ('no_hits', 'reviewed')
        "#,
    )
    .bind(record_id)
    .bind(authority.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn clear(conn: &mut SqliteConnection, record_id: RecordId, authority: &Authority) -> Result<()> {
    sqlx::query("DELETE FROM review_status WHERE place_id = ? AND authority = ?")
        .bind(record_id)
        .bind(authority.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

/// Record counts per status within a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    pub unreviewed: i64,
    pub reviewed: i64,
    pub deferred: i64,
    pub no_hits: i64,
}

pub async fn status_totals(pool: &SqlitePool, dataset_id: i64, authority: &Authority) -> Result<StatusTotals> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT s.status, COUNT(*)
        FROM review_status s
        JOIN places p ON p.id = s.place_id
        WHERE p.dataset_id = ? AND s.authority = ?
        GROUP BY s.status
        "#,
    )
    .bind(dataset_id)
    .bind(authority.as_str())
    .fetch_all(pool)
    .await?;

    let mut totals = StatusTotals::default();
    for (status, count) in rows {
        match status.parse::<ReviewStatus>().map_err(Error::Internal)? {
            ReviewStatus::Unreviewed => totals.unreviewed = count,
            ReviewStatus::Reviewed => totals.reviewed = count,
            ReviewStatus::Deferred => totals.deferred = count,
            ReviewStatus::NoHits => totals.no_hits = count,
        }
    }
    Ok(totals)
}
