//! Hit queue storage
//!
//! Hits are written by the external matcher through [`insert_hits`] and are
//! immutable afterwards except for the `reviewed` flag and the relabel to the
//! `deferred` pass.

use gaz_common::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{Authority, CandidatePayload, Hit, NewHit, Pass, RecordId, ReviewStatus};

#[derive(sqlx::FromRow)]
struct HitRow {
    id: i64,
    place_id: i64,
    dataset_id: i64,
    task_id: String,
    authority: String,
    authrecord_id: String,
    pass: String,
    score: f64,
    payload: String,
    reviewed: bool,
}

impl TryFrom<HitRow> for Hit {
    type Error = Error;

    fn try_from(row: HitRow) -> Result<Self> {
        let pass = row.pass.parse::<Pass>().map_err(Error::Internal)?;
        let payload: CandidatePayload = serde_json::from_str(&row.payload)
            .map_err(|e| Error::Internal(format!("Hit {} payload unreadable: {}", row.id, e)))?;

        Ok(Hit {
            id: row.id,
            record_id: row.place_id,
            dataset_id: row.dataset_id,
            task_id: row.task_id,
            authority: Authority::new(row.authority),
            authrecord_id: row.authrecord_id,
            pass,
            score: row.score,
            payload,
            reviewed: row.reviewed,
        })
    }
}

const HIT_COLUMNS: &str =
    "id, place_id, dataset_id, task_id, authority, authrecord_id, pass, score, payload, reviewed";

fn rows_to_hits(rows: Vec<HitRow>) -> Result<Vec<Hit>> {
    rows.into_iter().map(Hit::try_from).collect()
}

/// Store hits from the matcher and queue their records for review
///
/// Records previously marked `no_hits` or `reviewed` for the authority are
/// reopened; deferred records stay deferred.
pub async fn insert_hits(pool: &SqlitePool, hits: &[NewHit]) -> Result<Vec<i64>> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(hits.len());

    for hit in hits {
        let payload = serde_json::to_string(&hit.payload)
            .map_err(|e| Error::InvalidInput(format!("Unserializable payload: {}", e)))?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO hits (place_id, dataset_id, task_id, authority, authrecord_id, pass, score, payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(hit.record_id)
        .bind(hit.dataset_id)
        .bind(&hit.task_id)
        .bind(hit.authority.as_str())
        .bind(&hit.authrecord_id)
        .bind(hit.pass.as_str())
        .bind(hit.score)
        .bind(payload)
        .fetch_one(&mut *tx)
        .await?;

        crate::db::review_status::reopen(&mut *tx, hit.record_id, &hit.authority).await?;
        ids.push(id);
    }

    tx.commit().await?;
    tracing::debug!(count = ids.len(), "Inserted hits");

    Ok(ids)
}

pub async fn get_hit(conn: &mut SqliteConnection, hit_id: i64) -> Result<Option<Hit>> {
    let row = sqlx::query_as::<_, HitRow>(&format!("SELECT {HIT_COLUMNS} FROM hits WHERE id = ?"))
        .bind(hit_id)
        .fetch_optional(conn)
        .await?;
    row.map(Hit::try_from).transpose()
}

/// Load the named hits that belong to the record and authority and are still unreviewed
///
/// Order follows `hit_ids`; ids that do not qualify are omitted.
pub async fn unreviewed_hits_by_id(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    authority: &Authority,
    hit_ids: &[i64],
) -> Result<Vec<Hit>> {
    let mut hits = Vec::with_capacity(hit_ids.len());
    for &hit_id in hit_ids {
        let row = sqlx::query_as::<_, HitRow>(&format!(
            "SELECT {HIT_COLUMNS} FROM hits WHERE id = ? AND place_id = ? AND authority = ? AND reviewed = 0"
        ))
        .bind(hit_id)
        .bind(record_id)
        .bind(authority.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = row {
            hits.push(Hit::try_from(row)?);
        }
    }
    Ok(hits)
}

/// Unreviewed hits of a record in one pass, best score first
pub async fn unreviewed_for_pass(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    authority: &Authority,
    pass: Pass,
) -> Result<Vec<Hit>> {
    let rows = sqlx::query_as::<_, HitRow>(&format!(
        r#"
        SELECT {HIT_COLUMNS} FROM hits
        WHERE place_id = ? AND authority = ? AND pass = ? AND reviewed = 0
        ORDER BY score DESC, id
        "#
    ))
    .bind(record_id)
    .bind(authority.as_str())
    .bind(pass.as_str())
    .fetch_all(conn)
    .await?;

    rows_to_hits(rows)
}

/// All hits for a record produced by one task
pub async fn hits_for_task(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    authority: &Authority,
    task_id: &str,
) -> Result<Vec<Hit>> {
    let rows = sqlx::query_as::<_, HitRow>(&format!(
        "SELECT {HIT_COLUMNS} FROM hits WHERE place_id = ? AND authority = ? AND task_id = ? ORDER BY id"
    ))
    .bind(record_id)
    .bind(authority.as_str())
    .bind(task_id)
    .fetch_all(conn)
    .await?;

    rows_to_hits(rows)
}

/// Flip hits to reviewed; already reviewed hits are not counted
pub async fn mark_reviewed(conn: &mut SqliteConnection, hit_ids: &[i64]) -> Result<u64> {
    let mut changed = 0;
    for &hit_id in hit_ids {
        changed += sqlx::query("UPDATE hits SET reviewed = 1 WHERE id = ? AND reviewed = 0")
            .bind(hit_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }
    Ok(changed)
}

/// Move hits into the deferred queue; they stay unreviewed
pub async fn relabel_deferred(conn: &mut SqliteConnection, hit_ids: &[i64]) -> Result<()> {
    for &hit_id in hit_ids {
        sqlx::query("UPDATE hits SET pass = ? WHERE id = ?")
            .bind(Pass::Deferred.as_str())
            .bind(hit_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Return one task's hits on a record to the unreviewed state
pub async fn reset_task(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    authority: &Authority,
    task_id: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE hits SET reviewed = 0 WHERE place_id = ? AND authority = ? AND task_id = ?",
    )
    .bind(record_id)
    .bind(authority.as_str())
    .bind(task_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_for_record(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    authority: &Authority,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM hits WHERE place_id = ? AND authority = ?")
        .bind(record_id)
        .bind(authority.as_str())
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Remaining work in one pass: (records, hits)
///
/// Only records whose status makes the pass workable are counted, so a
/// reviewed record with leftover hits does not hold a pass open.
pub async fn pass_remaining(
    pool: &SqlitePool,
    dataset_id: i64,
    authority: &Authority,
    pass: Pass,
) -> Result<(i64, i64)> {
    let status: ReviewStatus = pass.working_status();
    let (records, hits): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(DISTINCT h.place_id), COUNT(h.id)
        FROM hits h
        JOIN review_status s ON s.place_id = h.place_id AND s.authority = h.authority
        WHERE h.dataset_id = ? AND h.authority = ? AND h.pass = ? AND h.reviewed = 0
          AND s.status = ?
        "#,
    )
    .bind(dataset_id)
    .bind(authority.as_str())
    .bind(pass.as_str())
    .bind(status.as_str())
    .fetch_one(pool)
    .await?;

    Ok((records, hits))
}

/// Lowest record id with workable hits in a pass
pub async fn next_record_in_pass(
    pool: &SqlitePool,
    dataset_id: i64,
    authority: &Authority,
    pass: Pass,
) -> Result<Option<RecordId>> {
    let record_id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT h.place_id
        FROM hits h
        JOIN review_status s ON s.place_id = h.place_id AND s.authority = h.authority
        WHERE h.dataset_id = ? AND h.authority = ? AND h.pass = ? AND h.reviewed = 0
          AND s.status = ?
        ORDER BY h.place_id
        LIMIT 1
        "#,
    )
    .bind(dataset_id)
    .bind(authority.as_str())
    .bind(pass.as_str())
    .bind(pass.working_status().as_str())
    .fetch_optional(pool)
    .await?;

    Ok(record_id)
}
