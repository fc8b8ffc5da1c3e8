//! Shared test helpers: a scriptable in-memory scraper backend
#![allow(dead_code)]

use async_trait::async_trait;
use kw_common::config::TrackConfig;
use kw_common::events::{EventBus, TrackerEvent};
use kw_track::services::backend::{
    AddRoomResponse, AnalyzeResponse, AvailabilityTimelineResponse, BackendError,
    JobStatusResponse, LinkUrlResponse, ScraperBackend,
};
use kw_track::services::change_aggregator::RawChangeBatch;
use kw_track::services::job_tracker::{JobTracker, PollPolicy};
use kw_track::AppState;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scriptable stand-in for the scraper backend.
///
/// Each endpoint pops a scripted response; an empty script yields a benign
/// default (fresh job id / running status / empty payloads). Every call is
/// recorded so tests can assert what reached the backend.
pub struct StubBackend {
    pub analyze_script: Mutex<VecDeque<Result<AnalyzeResponse, BackendError>>>,
    pub status_script: Mutex<VecDeque<Result<JobStatusResponse, BackendError>>>,
    pub link_script: Mutex<VecDeque<Result<LinkUrlResponse, BackendError>>>,
    pub room_script: Mutex<VecDeque<Result<AddRoomResponse, BackendError>>>,

    /// Recorded (url, force_new) submissions
    pub submissions: Mutex<Vec<(String, bool)>>,
    /// Recorded (property_id, url) link calls
    pub links: Mutex<Vec<(String, String)>>,
    /// Recorded (property_id, url) separate-room calls
    pub rooms: Mutex<Vec<(String, String)>>,
    /// Total status polls received
    pub status_calls: AtomicUsize,

    pub change_batch: Mutex<serde_json::Value>,
    pub timeline: Mutex<serde_json::Value>,

    job_counter: AtomicUsize,
}

impl StubBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            analyze_script: Mutex::new(VecDeque::new()),
            status_script: Mutex::new(VecDeque::new()),
            link_script: Mutex::new(VecDeque::new()),
            room_script: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            links: Mutex::new(Vec::new()),
            rooms: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            change_batch: Mutex::new(serde_json::json!({})),
            timeline: Mutex::new(serde_json::json!({"rooms": []})),
            job_counter: AtomicUsize::new(0),
        })
    }

    pub fn push_analyze(&self, response: Result<AnalyzeResponse, BackendError>) {
        self.analyze_script.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, response: Result<JobStatusResponse, BackendError>) {
        self.status_script.lock().unwrap().push_back(response);
    }

    pub fn push_link(&self, response: Result<LinkUrlResponse, BackendError>) {
        self.link_script.lock().unwrap().push_back(response);
    }

    pub fn push_room(&self, response: Result<AddRoomResponse, BackendError>) {
        self.room_script.lock().unwrap().push_back(response);
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    fn next_job_id(&self) -> String {
        format!("job-{}", self.job_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Scripted analyze response carrying a plain job id
pub fn analyze_ok(job_id: &str) -> Result<AnalyzeResponse, BackendError> {
    Ok(serde_json::from_value(serde_json::json!({ "job_id": job_id })).unwrap())
}

/// Scripted analyze response with a duplicate candidate set
pub fn analyze_duplicate(
    url: &str,
    confidence: f64,
    auto_link_job: Option<&str>,
) -> Result<AnalyzeResponse, BackendError> {
    Ok(serde_json::from_value(serde_json::json!({
        "job_id": auto_link_job,
        "duplicate_detected": true,
        "duplicate_data": {
            "extracted_address": "Oudegracht 1, Utrecht",
            "source_url": url,
            "candidates": [{
                "property_id": "prop-1",
                "address": "Oudegracht 1, Utrecht",
                "proximity_level": "same_building",
                "confidence_score": confidence,
                "match_factors": {"street": 0.9}
            }]
        }
    }))
    .unwrap())
}

pub fn status_running() -> Result<JobStatusResponse, BackendError> {
    Ok(serde_json::from_value(serde_json::json!({
        "status": "running",
        "progress": {"scraping": "running", "coordinates": "completed"}
    }))
    .unwrap())
}

pub fn status_completed() -> Result<JobStatusResponse, BackendError> {
    Ok(serde_json::from_value(serde_json::json!({"status": "completed"})).unwrap())
}

pub fn status_failed(message: &str) -> Result<JobStatusResponse, BackendError> {
    Ok(serde_json::from_value(serde_json::json!({
        "status": "failed",
        "error": message
    }))
    .unwrap())
}

#[async_trait]
impl ScraperBackend for StubBackend {
    async fn submit_analysis(
        &self,
        url: &str,
        force_new: bool,
    ) -> Result<AnalyzeResponse, BackendError> {
        self.submissions
            .lock()
            .unwrap()
            .push((url.to_string(), force_new));

        let scripted = self.analyze_script.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None => analyze_ok(&self.next_job_id()),
        }
    }

    async fn job_status(&self, _job_id: &str) -> Result<JobStatusResponse, BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self.status_script.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None => status_running(),
        }
    }

    async fn link_url(
        &self,
        property_id: &str,
        new_url: &str,
    ) -> Result<LinkUrlResponse, BackendError> {
        self.links
            .lock()
            .unwrap()
            .push((property_id.to_string(), new_url.to_string()));

        let scripted = self.link_script.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None => Ok(LinkUrlResponse::default()),
        }
    }

    async fn add_separate_room(
        &self,
        property_id: &str,
        new_url: &str,
    ) -> Result<AddRoomResponse, BackendError> {
        self.rooms
            .lock()
            .unwrap()
            .push((property_id.to_string(), new_url.to_string()));

        let scripted = self.room_script.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None => Ok(AddRoomResponse::default()),
        }
    }

    async fn change_feed(
        &self,
        _property_id: &str,
        _days: Option<u32>,
    ) -> Result<RawChangeBatch, BackendError> {
        let value = self.change_batch.lock().unwrap().clone();
        serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn availability_timeline(
        &self,
        _property_id: &str,
        _days: Option<u32>,
    ) -> Result<AvailabilityTimelineResponse, BackendError> {
        let value = self.timeline.lock().unwrap().clone();
        serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

/// Poll policy with test-friendly pacing
pub fn fast_policy(ceiling: u32) -> PollPolicy {
    PollPolicy {
        initial_delay: Duration::from_millis(5),
        interval: Duration::from_millis(5),
        ceiling,
    }
}

/// JobTracker wired to a stub with fast pacing
pub fn tracker_with(backend: Arc<StubBackend>, ceiling: u32) -> (JobTracker, EventBus) {
    let event_bus = EventBus::new(64);
    let tracker = JobTracker::new(backend, event_bus.clone(), fast_policy(ceiling), 0.7);
    (tracker, event_bus)
}

/// AppState wired to a stub, for router tests
pub fn app_state_with(backend: Arc<StubBackend>) -> AppState {
    let mut config = TrackConfig::default();
    config.poll_initial_delay_ms = 5;
    config.poll_interval_ms = 5;
    config.poll_ceiling = 10;
    AppState::new(backend, EventBus::new(64), config)
}

/// Await a specific event type on the bus, with a guard timeout
pub async fn wait_for_event<F>(
    rx: &mut tokio::sync::broadcast::Receiver<TrackerEvent>,
    mut predicate: F,
) -> TrackerEvent
where
    F: FnMut(&TrackerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Convenience: assert a job terminal state arrived
pub fn is_failed(event: &TrackerEvent) -> bool {
    matches!(event, TrackerEvent::AnalysisFailed { .. })
}

pub fn is_completed(event: &TrackerEvent) -> bool {
    matches!(event, TrackerEvent::AnalysisCompleted { .. })
}

pub fn is_invalidation(event: &TrackerEvent) -> bool {
    matches!(event, TrackerEvent::ListingsInvalidated { .. })
}

/// Listing URL on the supported domain
pub fn listing_url() -> String {
    "https://kamernet.nl/huren/kamer-utrecht/oudegracht/kamer-123".to_string()
}
