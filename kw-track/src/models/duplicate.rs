//! Duplicate match candidates and resolution decisions
//!
//! The matcher behind the backend is opaque to this service: it delivers a
//! ranked candidate set with confidence scores and labelled sub-scores, and
//! kw-track only decides how to act on it.

use kw_common::events::ResolutionAction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How close the matcher believes a candidate is to the submitted listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityLevel {
    SameAddress,
    SameBuilding,
    SameBlock,
    SameStreet,
    WalkingDistance,
    SameNeighborhood,
    /// Catch-all for proximity labels this service does not recognize
    #[serde(other)]
    Unknown,
}

/// One previously tracked property the matcher believes may be the same
/// real-world property as a new submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Existing property identifier
    #[serde(alias = "propertyId")]
    pub property_id: String,

    /// Address of the existing property
    pub address: String,

    /// Distance between candidate and extracted address, when geocoded
    #[serde(default, alias = "distanceMeters")]
    pub distance_meters: Option<f64>,

    /// Matcher's proximity label
    #[serde(default = "ProximityLevel::unknown", alias = "proximityLevel")]
    pub proximity_level: ProximityLevel,

    /// Overall match confidence in [0.0, 1.0]
    #[serde(alias = "confidenceScore")]
    pub confidence_score: f64,

    /// Labelled sub-scores, each in [0.0, 1.0]; keys are sparse
    #[serde(default, alias = "matchFactors")]
    pub match_factors: BTreeMap<String, f64>,

    /// Denormalized display fields, opaque to this service
    #[serde(default, alias = "propertySummary")]
    pub property_summary: serde_json::Value,
}

impl ProximityLevel {
    fn unknown() -> Self {
        ProximityLevel::Unknown
    }
}

/// Matcher output for one submitted URL.
///
/// `candidates` is ranked best-first by the matcher; insertion order is the
/// rank and must never be re-sorted. The set only exists when non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidateSet {
    /// Best-effort address parsed before full analysis
    #[serde(default, alias = "extractedAddress")]
    pub extracted_address: Option<String>,

    /// Listing URL that triggered the match
    #[serde(alias = "sourceUrl")]
    pub source_url: String,

    /// Ranked candidates, best match first
    pub candidates: Vec<MatchCandidate>,
}

impl DuplicateCandidateSet {
    /// The candidate presented to the caller. The rest of the set exists
    /// only for explanatory detail (match factors, distances).
    pub fn top(&self) -> Option<&MatchCandidate> {
        self.candidates.first()
    }

    /// Confidence of the best candidate, 0.0 for a (malformed) empty set
    pub fn top_confidence(&self) -> f64 {
        self.top().map(|c| c.confidence_score).unwrap_or(0.0)
    }
}

/// Caller decision for a duplicate-flagged submission.
///
/// The three variants map 1:1 to backend operations; see the resolver for
/// the capability fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ResolutionDecision {
    /// Same property, different listing: link the URL onto it
    LinkToExisting { property_id: String, url: String },
    /// Separate room in the same building: register a new room
    AddSeparateRoom { property_id: String, url: String },
    /// Different property entirely: force a new property record
    CreateSeparate { url: String },
}

impl ResolutionDecision {
    /// Listing URL the decision concerns
    pub fn url(&self) -> &str {
        match self {
            ResolutionDecision::LinkToExisting { url, .. }
            | ResolutionDecision::AddSeparateRoom { url, .. }
            | ResolutionDecision::CreateSeparate { url } => url,
        }
    }
}

/// What a resolution actually did, and the job now being tracked (if any)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    /// Operation performed, including the observable capability fallback
    pub action: ResolutionAction,
    /// Existing property involved, when applicable
    pub property_id: Option<String>,
    /// Backend job now tracked by the JobTracker, when one was produced
    pub job_id: Option<String>,
}
