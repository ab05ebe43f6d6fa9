//! Equivalence ledger
//!
//! Append-only, unordered pairs of records judged to describe the same place.
//! Pairs are stored as `(min, max)` so `(a, b)` and `(b, a)` are one edge.

use gaz_common::Result;
use sqlx::SqliteConnection;

use crate::models::RecordId;

/// Where an edge came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeProvenance {
    /// `review` for reviewer decisions, `merge` for reassigned children
    pub basis: String,
    pub task_id: Option<String>,
    pub created_by: Option<String>,
}

impl EdgeProvenance {
    pub fn review(task_id: Option<String>, created_by: Option<String>) -> Self {
        Self {
            basis: "review".to_string(),
            task_id,
            created_by,
        }
    }

    /// Same basis and author, tagged with `task_id` when one is known
    pub fn for_task(&self, task_id: Option<&str>) -> Self {
        Self {
            task_id: task_id.map(str::to_string).or_else(|| self.task_id.clone()),
            ..self.clone()
        }
    }

    /// Same task and author, recorded as a consequence of a merge
    pub fn as_merge(&self) -> Self {
        Self {
            basis: "merge".to_string(),
            ..self.clone()
        }
    }
}

/// Insert an edge; returns false for self-pairs and existing edges
pub async fn add_edge(
    conn: &mut SqliteConnection,
    a: RecordId,
    b: RecordId,
    provenance: &EdgeProvenance,
) -> Result<bool> {
    if a == b {
        return Ok(false);
    }
    let (low, high) = if a < b { (a, b) } else { (b, a) };

    let result = sqlx::query(
        r#"
        INSERT INTO close_matches (place_a, place_b, basis, task_id, created_by)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(place_a, place_b) DO NOTHING
        "#,
    )
    .bind(low)
    .bind(high)
    .bind(&provenance.basis)
    .bind(provenance.task_id.as_deref())
    .bind(provenance.created_by.as_deref())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn has_edge(conn: &mut SqliteConnection, a: RecordId, b: RecordId) -> Result<bool> {
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM close_matches WHERE place_a = ? AND place_b = ?)",
    )
    .bind(low)
    .bind(high)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}
