//! Analysis job state machine
//!
//! One `AnalysisJob` per in-flight backend analysis, owned exclusively by
//! the JobTracker registry. State moves `pending → running → {completed |
//! failed}`; terminal states are sticky and the job is dropped from the
//! registry once one is reached.

use chrono::{DateTime, Utc};
use kw_common::events::{JobState, StepProgress, StepState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named analysis sub-steps in backend execution order.
///
/// Unknown step names reported by the backend are appended after these,
/// alphabetically, so progress snapshots are deterministic.
const KNOWN_STEPS: [&str; 5] = [
    "coordinates",
    "geocoding",
    "property_details",
    "scraping",
    "excel_export",
];

/// One in-flight or just-finished remote analysis task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    /// Opaque job token issued by the backend
    pub job_id: String,

    /// Listing URL under analysis
    pub source_url: String,

    /// Current job state
    pub state: JobState,

    /// Sub-step progress (informational only, never drives control flow)
    pub progress: Vec<StepProgress>,

    /// Error text for failed jobs
    pub error: Option<String>,

    /// When tracking began
    pub created_at: DateTime<Utc>,

    /// When the last status poll was applied
    pub last_polled_at: Option<DateTime<Utc>>,

    /// Status polls issued so far
    pub polls: u32,
}

impl AnalysisJob {
    /// Create a freshly tracked job in `pending`
    pub fn new(job_id: String, source_url: String) -> Self {
        Self {
            job_id,
            source_url,
            state: JobState::Pending,
            progress: Vec::new(),
            error: None,
            created_at: Utc::now(),
            last_polled_at: None,
            polls: 0,
        }
    }

    /// Transition to a new state, returning the previous one.
    ///
    /// Terminal states are sticky: a transition out of `completed` or
    /// `failed` is ignored and the current state is returned unchanged.
    pub fn transition_to(&mut self, new_state: JobState) -> JobState {
        let old_state = self.state;
        if old_state.is_terminal() {
            return old_state;
        }
        self.state = new_state;
        old_state
    }

    /// True once the job has reached `completed` or `failed`
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Replace the progress snapshot, reporting whether it changed
    pub fn apply_progress(&mut self, steps: Vec<StepProgress>) -> bool {
        if self.progress == steps {
            return false;
        }
        self.progress = steps;
        true
    }
}

/// Order a backend progress map into a deterministic step list:
/// known steps first in execution order, then unknown names alphabetically.
pub fn steps_from_map(progress: &BTreeMap<String, StepState>) -> Vec<StepProgress> {
    let mut steps = Vec::with_capacity(progress.len());

    for name in KNOWN_STEPS {
        if let Some(state) = progress.get(name) {
            steps.push(StepProgress {
                name: name.to_string(),
                state: *state,
            });
        }
    }

    // BTreeMap iteration is already alphabetical for the remainder.
    for (name, state) in progress {
        if !KNOWN_STEPS.contains(&name.as_str()) {
            steps.push(StepProgress {
                name: name.clone(),
                state: *state,
            });
        }
    }

    steps
}
