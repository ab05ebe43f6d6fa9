//! Contributed place record

use serde::{Deserialize, Serialize};

use super::RecordId;

/// A place record as seen by the review engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Record {
    pub id: RecordId,
    pub dataset_id: i64,
    /// Dataset label, used as the `dataset` field of index documents
    pub dataset: String,
    pub title: String,
    pub indexed: bool,
}
