//! Candidate matches ("hits") produced by reconciliation
//!
//! A hit pairs a contributed record with one authority record. Its payload is
//! what the authority knows about the place; accepted hits copy parts of it
//! onto the contributed record (augmentation) or, for the canonical
//! authority, feed cluster consolidation.

use serde::{Deserialize, Serialize};

use super::{Authority, CanonicalMatch, ClusterId, ClusterRef, Pass, RecordId};

/// Stored hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: i64,
    pub record_id: RecordId,
    pub dataset_id: i64,
    /// Reconciliation task (review batch) that produced the hit
    pub task_id: String,
    pub authority: Authority,
    /// Identifier of the matched record within the authority
    pub authrecord_id: String,
    pub pass: Pass,
    pub score: f64,
    pub payload: CandidatePayload,
    pub reviewed: bool,
}

impl Hit {
    /// `"{authority}:{authrecord_id}"`, the link identifier written on acceptance
    pub fn link_identifier(&self) -> String {
        format!("{}:{}", self.authority, self.authrecord_id)
    }

    /// Interpret this hit as a match against the canonical index
    ///
    /// The payload's cluster id wins; otherwise the authority record id is
    /// taken to be an indexed record id.
    pub fn canonical_match(&self) -> Option<CanonicalMatch> {
        let weight = self.payload.weight.unwrap_or(0);
        let target = match self.payload.cluster_id {
            Some(cluster_id) => ClusterRef::Cluster(cluster_id),
            None => ClusterRef::Record(self.authrecord_id.parse::<RecordId>().ok()?),
        };
        Some(CanonicalMatch::new(target, weight).with_task(self.task_id.clone()))
    }
}

/// Hit as delivered by the matcher, before it has an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHit {
    pub record_id: RecordId,
    pub dataset_id: i64,
    pub task_id: String,
    pub authority: Authority,
    pub authrecord_id: String,
    pub pass: Pass,
    pub score: f64,
    #[serde(default)]
    pub payload: CandidatePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateName {
    pub toponym: String,
    #[serde(default)]
    pub lang: Option<String>,
}

/// GeoJSON-style geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateGeometry {
    #[serde(rename = "type")]
    pub geom_type: String,
    pub coordinates: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub value: String,
    #[serde(default)]
    pub lang: Option<String>,
}

const GEOMETRY_TYPES: &[&str] = &[
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
];

/// What the authority knows about the matched place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidatePayload {
    #[serde(default)]
    pub names: Vec<CandidateName>,
    #[serde(default)]
    pub geometries: Vec<CandidateGeometry>,
    /// Further identifiers the authority lists for the place
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub descriptions: Vec<CandidateDescription>,
    /// Canonical cluster of the matched record (canonical authority only)
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
    /// Provenance weight used to pick a merge winner
    #[serde(default)]
    pub weight: Option<i64>,
}

impl CandidatePayload {
    /// Reject payloads the fact tables cannot hold
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = self.names.iter().find(|n| n.toponym.trim().is_empty()) {
            return Err(format!("empty toponym (lang {:?})", name.lang));
        }

        for geometry in &self.geometries {
            if !GEOMETRY_TYPES.contains(&geometry.geom_type.as_str()) {
                return Err(format!("unsupported geometry type '{}'", geometry.geom_type));
            }
            if !geometry.coordinates.is_array() {
                return Err(format!("{} coordinates must be an array", geometry.geom_type));
            }
        }

        if self.descriptions.iter().any(|d| d.value.trim().is_empty()) {
            return Err("empty description".to_string());
        }

        if self.links.iter().any(|l| l.trim().is_empty()) {
            return Err("empty link identifier".to_string());
        }

        if matches!(self.weight, Some(w) if w < 0) {
            return Err("negative weight".to_string());
        }

        Ok(())
    }
}
