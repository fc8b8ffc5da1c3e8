//! Analysis job tracking
//!
//! Owns the polling state machine for remote analysis jobs. Submitting a
//! listing URL either starts tracking a backend job or surfaces a duplicate
//! candidate set for the caller to resolve. Each tracked job gets its own
//! polling task with an owned cancellation token; state transitions are
//! published on the EventBus, never returned to a blocked caller.
//!
//! Poll pacing: one initial delay, then a fixed interval, with a hard
//! ceiling of polls after which the job is force-failed regardless of what
//! the backend would eventually say. Each poll awaits the previous one's
//! response, so status snapshots apply in send order.

use chrono::Utc;
use kw_common::config::TrackConfig;
use kw_common::events::{EventBus, JobState, TrackerEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::TrackError;
use crate::models::analysis_job::{steps_from_map, AnalysisJob};
use crate::models::duplicate::DuplicateCandidateSet;
use crate::services::backend::{BackendError, JobStatusResponse, ScraperBackend};

/// Listing domain accepted for analysis submissions
pub const SUPPORTED_LISTING_DOMAIN: &str = "kamernet.nl";

/// Result of submitting a listing URL
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// A backend job exists and is now being polled
    Tracking { job_id: String },
    /// The matcher flagged a possible duplicate below the auto-link
    /// threshold; no job is tracked until the caller resolves it
    NeedsResolution { candidates: DuplicateCandidateSet },
}

/// Poll pacing for tracked jobs
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Delay before the first status request
    pub initial_delay: Duration,
    /// Fixed interval between subsequent requests
    pub interval: Duration,
    /// Hard ceiling on status requests per job
    pub ceiling: u32,
}

impl PollPolicy {
    pub fn from_config(config: &TrackConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.poll_initial_delay_ms),
            interval: Duration::from_millis(config.poll_interval_ms),
            ceiling: config.poll_ceiling,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&TrackConfig::default())
    }
}

struct TrackedJob {
    job: AnalysisJob,
    cancel: CancellationToken,
}

/// Tracks analysis jobs and drives their polling loops
#[derive(Clone)]
pub struct JobTracker {
    backend: Arc<dyn ScraperBackend>,
    event_bus: EventBus,
    registry: Arc<RwLock<HashMap<String, TrackedJob>>>,
    policy: PollPolicy,
    auto_link_threshold: f64,
}

impl JobTracker {
    pub fn new(
        backend: Arc<dyn ScraperBackend>,
        event_bus: EventBus,
        policy: PollPolicy,
        auto_link_threshold: f64,
    ) -> Self {
        Self {
            backend,
            event_bus,
            registry: Arc::new(RwLock::new(HashMap::new())),
            policy,
            auto_link_threshold,
        }
    }

    /// Submit a listing URL for analysis.
    ///
    /// Rejects URLs outside the supported listing domain before anything is
    /// sent to the backend. When the backend flags a duplicate whose best
    /// candidate sits below the auto-link threshold, returns
    /// `NeedsResolution` and tracks nothing; at or above the threshold the
    /// backend has already auto-linked and the returned job is tracked
    /// normally.
    pub async fn submit(&self, url: &str) -> Result<SubmissionOutcome, TrackError> {
        validate_listing_url(url)?;

        let response = self.backend.submit_analysis(url, false).await?;

        if response.duplicate_detected {
            if let Some(set) = response.duplicate_data {
                let top_confidence = set.top_confidence();
                if top_confidence < self.auto_link_threshold {
                    tracing::info!(
                        url = %url,
                        top_confidence,
                        candidates = set.candidates.len(),
                        "Duplicate candidates need caller resolution"
                    );
                    self.event_bus.emit_lossy(TrackerEvent::DuplicateDetected {
                        source_url: url.to_string(),
                        extracted_address: set.extracted_address.clone(),
                        top_confidence,
                        candidate_count: set.candidates.len(),
                        timestamp: Utc::now(),
                    });
                    return Ok(SubmissionOutcome::NeedsResolution { candidates: set });
                }

                tracing::info!(
                    url = %url,
                    top_confidence,
                    "Backend auto-linked high-confidence duplicate"
                );
            }
        }

        let job_id = response.job_id.ok_or_else(|| {
            TrackError::Transport(BackendError::Decode(
                "analyze response carried no job id".to_string(),
            ))
        })?;

        self.track(job_id.clone(), url.to_string()).await;
        Ok(SubmissionOutcome::Tracking { job_id })
    }

    /// Begin polling an existing backend job.
    ///
    /// Idempotent per job id: tracking an id that is already tracked is a
    /// no-op, so a resubmitted decision cannot spawn a second poll loop.
    pub async fn track(&self, job_id: String, source_url: String) {
        {
            let mut registry = self.registry.write().await;
            if registry.contains_key(&job_id) {
                tracing::warn!(job_id = %job_id, "Job already tracked, ignoring");
                return;
            }

            let cancel = CancellationToken::new();
            registry.insert(
                job_id.clone(),
                TrackedJob {
                    job: AnalysisJob::new(job_id.clone(), source_url.clone()),
                    cancel: cancel.clone(),
                },
            );

            let tracker = self.clone();
            let loop_job_id = job_id.clone();
            let loop_url = source_url.clone();
            tokio::spawn(async move {
                tracker.poll_loop(loop_job_id, loop_url, cancel).await;
            });
        }

        tracing::info!(job_id = %job_id, url = %source_url, "Tracking analysis job");
        self.event_bus.emit_lossy(TrackerEvent::AnalysisSubmitted {
            job_id,
            source_url,
            timestamp: Utc::now(),
        });
    }

    /// Snapshot of a tracked job, if it is still in the registry
    pub async fn snapshot(&self, job_id: &str) -> Option<AnalysisJob> {
        self.registry
            .read()
            .await
            .get(job_id)
            .map(|tracked| tracked.job.clone())
    }

    /// Snapshots of all tracked jobs
    pub async fn active_jobs(&self) -> Vec<AnalysisJob> {
        self.registry
            .read()
            .await
            .values()
            .map(|tracked| tracked.job.clone())
            .collect()
    }

    /// Drop interest in a job: stop its polling loop at the next tick
    /// boundary and forget it. The backend job itself is left alone
    /// (fire-and-forget); an in-flight status response is discarded.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let removed = self.registry.write().await.remove(job_id);
        match removed {
            Some(tracked) => {
                tracked.cancel.cancel();
                tracing::info!(job_id = %job_id, "Job tracking cancelled by caller");
                true
            }
            None => false,
        }
    }

    async fn poll_loop(self, job_id: String, source_url: String, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.policy.initial_delay) => {}
        }

        loop {
            if cancel.is_cancelled() {
                return;
            }

            // One status request per tick; a cancellation mid-flight drops
            // the response on the floor.
            let status = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.backend.job_status(&job_id) => result,
            };

            let Some(polls) = self.record_poll(&job_id).await else {
                // Job vanished from the registry (cancelled concurrently).
                return;
            };

            match status {
                Ok(snapshot) => {
                    if self.apply_status(&job_id, &source_url, snapshot).await {
                        return;
                    }
                }
                Err(error) => {
                    // A failed poll attempt is not a failed job; retry on
                    // the next scheduled tick.
                    tracing::warn!(
                        job_id = %job_id,
                        poll = polls,
                        error = %error,
                        "Status poll failed, retrying on next tick"
                    );
                }
            }

            if polls >= self.policy.ceiling {
                self.force_timeout(&job_id, &source_url, polls).await;
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }

    /// Count a poll against the job. Returns the new poll count, or `None`
    /// when the job is no longer tracked.
    async fn record_poll(&self, job_id: &str) -> Option<u32> {
        let mut registry = self.registry.write().await;
        let tracked = registry.get_mut(job_id)?;
        tracked.job.polls += 1;
        tracked.job.last_polled_at = Some(Utc::now());
        Some(tracked.job.polls)
    }

    /// Apply one status snapshot. Returns true when the job reached a
    /// terminal state and was disposed of.
    async fn apply_status(
        &self,
        job_id: &str,
        source_url: &str,
        snapshot: JobStatusResponse,
    ) -> bool {
        let mut events = Vec::new();
        let mut terminal = false;

        {
            let mut registry = self.registry.write().await;
            let Some(tracked) = registry.get_mut(job_id) else {
                return true;
            };
            let job = &mut tracked.job;

            let old_state = job.transition_to(snapshot.status);
            let new_state = job.state;

            if let Some(progress) = &snapshot.progress {
                let steps = steps_from_map(progress);
                if job.apply_progress(steps.clone()) && !steps.is_empty() {
                    events.push(TrackerEvent::JobProgress {
                        job_id: job_id.to_string(),
                        steps,
                        timestamp: Utc::now(),
                    });
                }
            }

            if snapshot.error.is_some() {
                job.error = snapshot.error.clone();
            }

            if old_state != new_state {
                tracing::info!(
                    job_id = %job_id,
                    old_state = ?old_state,
                    new_state = ?new_state,
                    "Job state changed"
                );
                events.push(TrackerEvent::JobStateChanged {
                    job_id: job_id.to_string(),
                    old_state,
                    new_state,
                    timestamp: Utc::now(),
                });
            }

            if new_state.is_terminal() {
                terminal = true;
                let polls = job.polls;

                match new_state {
                    JobState::Completed => {
                        events.push(TrackerEvent::AnalysisCompleted {
                            job_id: job_id.to_string(),
                            source_url: source_url.to_string(),
                            polls,
                            timestamp: Utc::now(),
                        });
                        // Downstream listing caches are stale now.
                        events.push(TrackerEvent::ListingsInvalidated {
                            job_id: job_id.to_string(),
                            timestamp: Utc::now(),
                        });
                    }
                    JobState::Failed => {
                        let error = job
                            .error
                            .clone()
                            .unwrap_or_else(|| "Analysis failed".to_string());
                        events.push(TrackerEvent::AnalysisFailed {
                            job_id: job_id.to_string(),
                            source_url: source_url.to_string(),
                            error,
                            timed_out: false,
                            timestamp: Utc::now(),
                        });
                    }
                    _ => {}
                }

                // Terminal states are sticky and the job is done polling;
                // drop it from the registry.
                registry.remove(job_id);
            }
        }

        for event in events {
            self.event_bus.emit_lossy(event);
        }

        terminal
    }

    /// Force-fail a job that hit the poll ceiling, independent of whatever
    /// the backend might still report.
    async fn force_timeout(&self, job_id: &str, source_url: &str, polls: u32) {
        let old_state = {
            let mut registry = self.registry.write().await;
            match registry.remove(job_id) {
                Some(mut tracked) => {
                    let old = tracked.job.transition_to(JobState::Failed);
                    Some(old)
                }
                None => None,
            }
        };

        let Some(old_state) = old_state else {
            return;
        };

        tracing::warn!(
            job_id = %job_id,
            polls,
            "Poll ceiling reached, failing job"
        );

        if old_state != JobState::Failed {
            self.event_bus.emit_lossy(TrackerEvent::JobStateChanged {
                job_id: job_id.to_string(),
                old_state,
                new_state: JobState::Failed,
                timestamp: Utc::now(),
            });
        }

        self.event_bus.emit_lossy(TrackerEvent::AnalysisFailed {
            job_id: job_id.to_string(),
            source_url: source_url.to_string(),
            error: TrackError::AnalysisTimeout.to_string(),
            timed_out: true,
            timestamp: Utc::now(),
        });
    }
}

/// Validate that a URL points at the supported listing domain.
///
/// Runs before submission; a rejected URL never reaches the backend.
pub fn validate_listing_url(url: &str) -> Result<(), TrackError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|_| TrackError::InvalidUrl(format!("not a valid URL: {}", url)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(TrackError::InvalidUrl(format!(
            "unsupported scheme: {}",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| TrackError::InvalidUrl(format!("URL has no host: {}", url)))?;

    let supported = host == SUPPORTED_LISTING_DOMAIN
        || host.ends_with(&format!(".{}", SUPPORTED_LISTING_DOMAIN));
    if !supported {
        return Err(TrackError::InvalidUrl(format!(
            "host {} is not a {} listing",
            host, SUPPORTED_LISTING_DOMAIN
        )));
    }

    Ok(())
}
