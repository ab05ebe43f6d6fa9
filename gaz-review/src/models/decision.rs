//! Reviewer decisions

use serde::{Deserialize, Serialize};

use super::{Authority, Pass, RecordId};

/// Reviewer's verdict on one hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    CloseMatch,
    ExactMatch,
    NoMatch,
    Defer,
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::CloseMatch | Verdict::ExactMatch)
    }

    /// `place_links.link_type` written for an accepted match
    pub fn link_type(&self) -> &'static str {
        match self {
            Verdict::ExactMatch => "exactMatch",
            _ => "closeMatch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub hit_id: i64,
    pub verdict: Verdict,
}

/// Which fact types an accepted hit may copy onto the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentOptions {
    #[serde(default = "default_true")]
    pub geometry: bool,
    #[serde(default = "default_true")]
    pub names: bool,
    #[serde(default)]
    pub descriptions: bool,
}

impl Default for AugmentOptions {
    fn default() -> Self {
        Self {
            geometry: true,
            names: true,
            descriptions: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// All of a reviewer's decisions for one record against one authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionBatch {
    pub dataset_id: i64,
    pub record_id: RecordId,
    pub authority: Authority,
    /// Pass the reviewer was working in; selects the expected review status
    pub pass: Pass,
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub options: AugmentOptions,
    /// Reviewer, recorded as equivalence edge provenance
    #[serde(default)]
    pub reviewer: Option<String>,
}

impl DecisionBatch {
    /// True when every decision postpones its hit
    pub fn is_all_deferred(&self) -> bool {
        !self.decisions.is_empty() && self.decisions.iter().all(|d| d.verdict == Verdict::Defer)
    }
}
