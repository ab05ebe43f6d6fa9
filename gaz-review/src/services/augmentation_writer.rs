//! Augmentation Writer
//!
//! Copies facts from an accepted non-canonical hit onto the contributed
//! record. Every row is tagged with the hit's `task_id`:
//! - a fact type already written for that task is skipped (idempotent retry)
//! - undo deletes exactly the rows of that task
//!
//! The writer never touches the document index.

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::db::facts::{self, FactKind};
use crate::error::{ReviewError, ReviewResult};
use crate::models::{AugmentOptions, Hit, Record};

/// What one accepted hit added to the record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AugmentReport {
    pub names: u64,
    pub geometries: u64,
    pub descriptions: u64,
    /// False when the record already carried the link identifier
    pub link_added: bool,
}

/// Write facts for one accepted hit
pub async fn augment(
    conn: &mut SqliteConnection,
    record: &Record,
    hit: &Hit,
    link_type: &str,
    options: AugmentOptions,
) -> ReviewResult<AugmentReport> {
    hit.payload
        .validate()
        .map_err(|reason| ReviewError::InvalidPayload(format!("hit {}: {}", hit.id, reason)))?;

    let payload = &hit.payload;
    let task_id = hit.task_id.as_str();
    let mut report = AugmentReport::default();

    if options.names
        && !payload.names.is_empty()
        && !facts::has_task_facts(conn, FactKind::Name, record.id, task_id).await?
    {
        report.names = facts::insert_names(conn, record.id, task_id, &payload.names).await?;
    }

    if options.geometry
        && !payload.geometries.is_empty()
        && !facts::has_task_facts(conn, FactKind::Geometry, record.id, task_id).await?
    {
        report.geometries =
            facts::insert_geometries(conn, record.id, task_id, &payload.geometries).await?;
    }

    if options.descriptions
        && !payload.descriptions.is_empty()
        && !facts::has_task_facts(conn, FactKind::Description, record.id, task_id).await?
    {
        report.descriptions =
            facts::insert_descriptions(conn, record.id, task_id, &payload.descriptions).await?;
    }

    let links_before = facts::count_links(conn, record.id).await?;
    report.link_added =
        facts::insert_link(conn, record.id, &hit.link_identifier(), link_type, task_id).await?;

    if report.link_added {
        let first_link = if links_before == 0 { 1 } else { 0 };
        facts::adjust_link_counters(conn, record.dataset_id, 1, first_link).await?;
    }

    tracing::debug!(
        record_id = record.id,
        hit_id = hit.id,
        task_id,
        names = report.names,
        geometries = report.geometries,
        descriptions = report.descriptions,
        link_added = report.link_added,
        "Augmented record"
    );

    Ok(report)
}
