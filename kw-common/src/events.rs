//! Event types for the kamerwatch event system
//!
//! Provides shared event definitions and the EventBus used by kw-track to
//! publish analysis lifecycle changes. The UI never polls this service for
//! state: every observable transition is broadcast here and forwarded over
//! SSE, so subscribers see job state in send order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Analysis job state as reported by the scraper backend.
///
/// `Completed` and `Failed` are terminal and sticky: once either is applied
/// the job is never polled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    /// True for states after which no further polling occurs.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// State of one named analysis sub-step.
///
/// Sub-steps are informational only; they never drive control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Progress of one named sub-step (`coordinates`, `geocoding`,
/// `property_details`, `scraping`, `excel_export`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    /// Sub-step name as reported by the backend
    pub name: String,
    /// Current sub-step state
    pub state: StepState,
}

/// Which operation a duplicate resolution actually performed.
///
/// `SeparatePropertyFallback` is deliberately distinct from
/// `SeparatePropertyCreated`: it records that a separate-room request was
/// downgraded because the backend lacks that capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    LinkedToExisting,
    SeparateRoomAdded,
    SeparatePropertyCreated,
    SeparatePropertyFallback,
}

/// Kamerwatch tracker event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// All observable analysis lifecycle changes use this central enum for type
/// safety and exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackerEvent {
    /// A listing URL was accepted and a backend job is now tracked
    AnalysisSubmitted {
        /// Opaque backend job token
        job_id: String,
        /// Listing URL under analysis
        source_url: String,
        /// When tracking began
        timestamp: DateTime<Utc>,
    },

    /// The backend flagged a submission as a possible duplicate below the
    /// auto-link threshold; tracking is suspended until the caller resolves
    DuplicateDetected {
        /// Listing URL that triggered the match
        source_url: String,
        /// Address extracted before full analysis, if any
        extracted_address: Option<String>,
        /// Confidence of the best candidate
        top_confidence: f64,
        /// Number of candidates in the set
        candidate_count: usize,
        /// When the candidate set was received
        timestamp: DateTime<Utc>,
    },

    /// A tracked job moved between states
    JobStateChanged {
        job_id: String,
        old_state: JobState,
        new_state: JobState,
        timestamp: DateTime<Utc>,
    },

    /// Sub-step progress snapshot for a running job
    JobProgress {
        job_id: String,
        steps: Vec<StepProgress>,
        timestamp: DateTime<Utc>,
    },

    /// A tracked job reached `completed`
    AnalysisCompleted {
        job_id: String,
        source_url: String,
        /// Status polls issued before completion
        polls: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tracked job reached `failed`, either backend-reported or forced by
    /// the polling ceiling
    AnalysisFailed {
        job_id: String,
        source_url: String,
        /// Backend error text, or the timeout message
        error: String,
        /// True when the poll ceiling forced the failure
        timed_out: bool,
        timestamp: DateTime<Utc>,
    },

    /// A duplicate-resolution decision was applied
    ResolutionApplied {
        /// What actually happened (including the documented fallback)
        action: ResolutionAction,
        /// Existing property involved, when applicable
        property_id: Option<String>,
        /// Job now being tracked, when the operation produced one
        job_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Cached property listings are stale; downstream readers should refresh
    ListingsInvalidated {
        /// Job whose completion invalidated the caches
        job_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl TrackerEvent {
    /// Event type name used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            TrackerEvent::AnalysisSubmitted { .. } => "AnalysisSubmitted",
            TrackerEvent::DuplicateDetected { .. } => "DuplicateDetected",
            TrackerEvent::JobStateChanged { .. } => "JobStateChanged",
            TrackerEvent::JobProgress { .. } => "JobProgress",
            TrackerEvent::AnalysisCompleted { .. } => "AnalysisCompleted",
            TrackerEvent::AnalysisFailed { .. } => "AnalysisFailed",
            TrackerEvent::ResolutionApplied { .. } => "ResolutionApplied",
            TrackerEvent::ListingsInvalidated { .. } => "ListingsInvalidated",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for tracker events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TrackerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if none are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TrackerEvent,
    ) -> Result<usize, broadcast::error::SendError<TrackerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Lifecycle events are still meaningful when no SSE client is
    /// connected; the poll loop uses this so emission never fails it.
    pub fn emit_lossy(&self, event: TrackerEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("EventBus: no subscribers for event");
        }
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
