//! Data models for gaz-review

pub mod decision;
pub mod hit;
pub mod record;

pub use decision::{AugmentOptions, Decision, DecisionBatch, Verdict};
pub use hit::{
    CandidateDescription, CandidateGeometry, CandidateName, CandidatePayload, Hit, NewHit,
};
pub use record::Record;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a contributed place record (`places.id`)
pub type RecordId = i64;

/// Identifier of a canonical cluster in the document index
pub type ClusterId = i64;

/// External authority a record is reconciled against (e.g. `wd`, `tgn`, `whg`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Authority(String);

impl Authority {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Authority {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Review pass
///
/// Hits are bucketed by match confidence into ordered passes; `Deferred`
/// collects hits a reviewer postponed and is only drained explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pass {
    Pass0,
    Pass1,
    Pass2,
    Pass3,
    Deferred,
}

impl Pass {
    /// Passes in review order (excludes `Deferred`)
    pub const ORDERED: [Pass; 4] = [Pass::Pass0, Pass::Pass1, Pass::Pass2, Pass::Pass3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pass::Pass0 => "pass0",
            Pass::Pass1 => "pass1",
            Pass::Pass2 => "pass2",
            Pass::Pass3 => "pass3",
            Pass::Deferred => "deferred",
        }
    }

    /// Review status a record must hold for its hits in this pass to be workable
    pub fn working_status(&self) -> ReviewStatus {
        match self {
            Pass::Deferred => ReviewStatus::Deferred,
            _ => ReviewStatus::Unreviewed,
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass0" => Ok(Pass::Pass0),
            "pass1" => Ok(Pass::Pass1),
            "pass2" => Ok(Pass::Pass2),
            "pass3" => Ok(Pass::Pass3),
            "deferred" => Ok(Pass::Deferred),
            other => Err(format!("Unknown pass '{}'", other)),
        }
    }
}

/// Per record × authority review status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Unreviewed,
    Reviewed,
    Deferred,
    NoHits,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Unreviewed => "unreviewed",
            ReviewStatus::Reviewed => "reviewed",
            ReviewStatus::Deferred => "deferred",
            ReviewStatus::NoHits => "no_hits",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unreviewed" => Ok(ReviewStatus::Unreviewed),
            "reviewed" => Ok(ReviewStatus::Reviewed),
            "deferred" => Ok(ReviewStatus::Deferred),
            "no_hits" => Ok(ReviewStatus::NoHits),
            other => Err(format!("Unknown review status '{}'", other)),
        }
    }
}

/// Reference to a canonical cluster, either directly or through one of its records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterRef {
    Cluster(ClusterId),
    Record(RecordId),
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterRef::Cluster(id) => write!(f, "cluster {}", id),
            ClusterRef::Record(id) => write!(f, "record {}", id),
        }
    }
}

/// An accepted match against the canonical index, weighted by provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMatch {
    pub target: ClusterRef,
    pub weight: i64,
    /// Matcher task that proposed it
    #[serde(default)]
    pub task_id: Option<String>,
}

impl CanonicalMatch {
    pub fn new(target: ClusterRef, weight: i64) -> Self {
        Self {
            target,
            weight,
            task_id: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}
