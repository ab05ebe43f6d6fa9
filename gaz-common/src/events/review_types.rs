//! Payload types carried by review and index events

use serde::{Deserialize, Serialize};

/// A surviving child promoted to root when its root was withdrawn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootPromotion {
    /// Record id of the withdrawn root
    pub old_root: i64,
    /// Record id of the promoted child
    pub new_root: i64,
    /// Cluster id allocated for the new root
    pub cluster_id: i64,
    /// Children re-pointed to the new root
    pub adopted: Vec<i64>,
}

/// Final status of a decision batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcomeKind {
    Reviewed,
    Deferred,
}
