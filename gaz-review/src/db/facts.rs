//! Fact rows attached to place records
//!
//! Rows written while applying a review batch carry the batch's `task_id`,
//! which is what makes augmentation idempotent and undoable.

use gaz_common::Result;
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::models::{CandidateDescription, CandidateGeometry, CandidateName, RecordId};

/// Fact tables the engine writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    Name,
    Geometry,
    Description,
    Link,
}

impl FactKind {
    fn table(&self) -> &'static str {
        match self {
            FactKind::Name => "place_names",
            FactKind::Geometry => "place_geoms",
            FactKind::Description => "place_descriptions",
            FactKind::Link => "place_links",
        }
    }
}

/// True when the record already carries facts of this kind from `task_id`
pub async fn has_task_facts(
    conn: &mut SqliteConnection,
    kind: FactKind,
    record_id: RecordId,
    task_id: &str,
) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE place_id = ? AND task_id = ?)",
        kind.table()
    ))
    .bind(record_id)
    .bind(task_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

pub async fn insert_names(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    task_id: &str,
    names: &[CandidateName],
) -> Result<u64> {
    let mut written = 0;
    for name in names {
        written += sqlx::query(
            "INSERT INTO place_names (place_id, toponym, lang, task_id) VALUES (?, ?, ?, ?)",
        )
        .bind(record_id)
        .bind(name.toponym.trim())
        .bind(name.lang.as_deref())
        .bind(task_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }
    Ok(written)
}

pub async fn insert_geometries(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    task_id: &str,
    geometries: &[CandidateGeometry],
) -> Result<u64> {
    let mut written = 0;
    for geometry in geometries {
        let geojson = serde_json::json!({
            "type": geometry.geom_type,
            "coordinates": geometry.coordinates,
        });
        written += sqlx::query(
            "INSERT INTO place_geoms (place_id, geom_type, geometry, task_id) VALUES (?, ?, ?, ?)",
        )
        .bind(record_id)
        .bind(&geometry.geom_type)
        .bind(geojson.to_string())
        .bind(task_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }
    Ok(written)
}

pub async fn insert_descriptions(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    task_id: &str,
    descriptions: &[CandidateDescription],
) -> Result<u64> {
    let mut written = 0;
    for description in descriptions {
        written += sqlx::query(
            "INSERT INTO place_descriptions (place_id, value, lang, task_id) VALUES (?, ?, ?, ?)",
        )
        .bind(record_id)
        .bind(&description.value)
        .bind(description.lang.as_deref())
        .bind(task_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }
    Ok(written)
}

/// Write a link fact unless the record already has this identifier
///
/// Returns true when a new row was written.
pub async fn insert_link(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    identifier: &str,
    link_type: &str,
    task_id: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO place_links (place_id, identifier, link_type, task_id)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(place_id, identifier) DO NOTHING
        "#,
    )
    .bind(record_id)
    .bind(identifier)
    .bind(link_type)
    .bind(task_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn count_links(conn: &mut SqliteConnection, record_id: RecordId) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM place_links WHERE place_id = ?")
        .bind(record_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Apply deltas to a dataset's link counters, never going below zero
pub async fn adjust_link_counters(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    total_links_delta: i64,
    numlinked_delta: i64,
) -> Result<()> {
    if total_links_delta == 0 && numlinked_delta == 0 {
        return Ok(());
    }
    sqlx::query(
        r#"
        UPDATE datasets
        SET total_links = MAX(total_links + ?, 0),
            numlinked = MAX(numlinked + ?, 0)
        WHERE id = ?
        "#,
    )
    .bind(total_links_delta)
    .bind(numlinked_delta)
    .bind(dataset_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Rows removed by [`delete_task_facts`], per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FactCounts {
    pub names: u64,
    pub geometries: u64,
    pub descriptions: u64,
    pub links: u64,
}

impl FactCounts {
    pub fn total(&self) -> u64 {
        self.names + self.geometries + self.descriptions + self.links
    }
}

/// Delete every fact row on the record tagged with `task_id`
pub async fn delete_task_facts(
    conn: &mut SqliteConnection,
    record_id: RecordId,
    task_id: &str,
) -> Result<FactCounts> {
    let mut counts = FactCounts::default();
    for kind in [FactKind::Name, FactKind::Geometry, FactKind::Description, FactKind::Link] {
        let deleted = sqlx::query(&format!(
            "DELETE FROM {} WHERE place_id = ? AND task_id = ?",
            kind.table()
        ))
        .bind(record_id)
        .bind(task_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        match kind {
            FactKind::Name => counts.names = deleted,
            FactKind::Geometry => counts.geometries = deleted,
            FactKind::Description => counts.descriptions = deleted,
            FactKind::Link => counts.links = deleted,
        }
    }
    Ok(counts)
}
