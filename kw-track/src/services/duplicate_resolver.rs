//! Duplicate resolution workflow
//!
//! Turns a caller decision about a duplicate-flagged submission into
//! exactly one backend operation chain, then hands the resulting job back
//! to the JobTracker. Stateless: the candidate set lives with the caller,
//! so a failed decision leaves it intact for a different one.
//!
//! Every decision path ends in a tracked job when the backend produced (or
//! a follow-up submission produced) one; link-only operations that return
//! no job trigger a fresh analysis submission so downstream data still
//! refreshes.

use chrono::Utc;
use kw_common::events::{EventBus, ResolutionAction, TrackerEvent};
use std::sync::Arc;

use crate::error::TrackError;
use crate::models::duplicate::{ResolutionDecision, ResolutionOutcome};
use crate::services::backend::{BackendError, ScraperBackend};
use crate::services::job_tracker::{validate_listing_url, JobTracker};

/// Drives the three-way duplicate resolution workflow
#[derive(Clone)]
pub struct DuplicateResolver {
    backend: Arc<dyn ScraperBackend>,
    tracker: JobTracker,
    event_bus: EventBus,
}

impl DuplicateResolver {
    pub fn new(backend: Arc<dyn ScraperBackend>, tracker: JobTracker, event_bus: EventBus) -> Self {
        Self {
            backend,
            tracker,
            event_bus,
        }
    }

    /// Apply a caller decision.
    ///
    /// Ambiguous backend failures are surfaced as
    /// [`TrackError::Resolution`] and never retried automatically: the
    /// backend is the authority on idempotence, and a blind retry could
    /// create the duplicate rooms this workflow exists to prevent. The one
    /// sanctioned substitution is the separate-room capability fallback,
    /// which is reported as its own [`ResolutionAction`] variant so callers
    /// can tell it apart from an intentional create-separate.
    pub async fn resolve(
        &self,
        decision: ResolutionDecision,
    ) -> Result<ResolutionOutcome, TrackError> {
        validate_listing_url(decision.url())?;

        let outcome = match decision {
            ResolutionDecision::LinkToExisting { property_id, url } => {
                self.link_to_existing(property_id, url).await?
            }
            ResolutionDecision::AddSeparateRoom { property_id, url } => {
                self.add_separate_room(property_id, url).await?
            }
            ResolutionDecision::CreateSeparate { url } => {
                let job_id = self.force_create(&url).await?;
                ResolutionOutcome {
                    action: ResolutionAction::SeparatePropertyCreated,
                    property_id: None,
                    job_id: Some(job_id),
                }
            }
        };

        self.event_bus.emit_lossy(TrackerEvent::ResolutionApplied {
            action: outcome.action,
            property_id: outcome.property_id.clone(),
            job_id: outcome.job_id.clone(),
            timestamp: Utc::now(),
        });

        Ok(outcome)
    }

    /// Same property, different listing: link the URL, then make sure an
    /// analysis job exists for it.
    async fn link_to_existing(
        &self,
        property_id: String,
        url: String,
    ) -> Result<ResolutionOutcome, TrackError> {
        let response = self
            .backend
            .link_url(&property_id, &url)
            .await
            .map_err(resolution_error)?;

        let job_id = match response.job_id {
            Some(job_id) => job_id,
            // Link-only operation: kick off the analysis ourselves so the
            // linked listing's data is still fetched.
            None => self.follow_up_analysis(&url).await?,
        };

        self.tracker.track(job_id.clone(), url).await;

        Ok(ResolutionOutcome {
            action: ResolutionAction::LinkedToExisting,
            property_id: Some(property_id),
            job_id: Some(job_id),
        })
    }

    /// Separate room, same building. Falls back to force-creating a new
    /// property when the backend lacks the separate-room handler; the
    /// submission is never silently dropped.
    async fn add_separate_room(
        &self,
        property_id: String,
        url: String,
    ) -> Result<ResolutionOutcome, TrackError> {
        match self.backend.add_separate_room(&property_id, &url).await {
            Ok(response) => {
                let job_id = match response.job_id {
                    Some(job_id) => job_id,
                    None => self.follow_up_analysis(&url).await?,
                };

                self.tracker.track(job_id.clone(), url).await;

                Ok(ResolutionOutcome {
                    action: ResolutionAction::SeparateRoomAdded,
                    property_id: Some(property_id),
                    job_id: Some(job_id),
                })
            }
            Err(BackendError::Unsupported) => {
                tracing::warn!(
                    property_id = %property_id,
                    url = %url,
                    "Backend lacks separate-room support, falling back to separate property"
                );

                let job_id = self.force_create(&url).await?;

                Ok(ResolutionOutcome {
                    action: ResolutionAction::SeparatePropertyFallback,
                    property_id: Some(property_id),
                    job_id: Some(job_id),
                })
            }
            Err(error) => Err(resolution_error(error)),
        }
    }

    /// Force creation of a brand-new property record, bypassing duplicate
    /// detection for this submission.
    async fn force_create(&self, url: &str) -> Result<String, TrackError> {
        let response = self
            .backend
            .submit_analysis(url, true)
            .await
            .map_err(resolution_error)?;

        let job_id = response.job_id.ok_or_else(|| {
            TrackError::Resolution("forced analysis produced no job".to_string())
        })?;

        self.tracker.track(job_id.clone(), url.to_string()).await;
        Ok(job_id)
    }

    /// Submit an analysis for a listing that was just linked/registered.
    /// The backend knows the URL now, so another duplicate flag here is an
    /// inconsistency we surface rather than recurse into.
    async fn follow_up_analysis(&self, url: &str) -> Result<String, TrackError> {
        let response = self
            .backend
            .submit_analysis(url, false)
            .await
            .map_err(resolution_error)?;

        response.job_id.ok_or_else(|| {
            TrackError::Resolution(
                "follow-up analysis after linking produced no job".to_string(),
            )
        })
    }
}

fn resolution_error(error: BackendError) -> TrackError {
    TrackError::Resolution(error.to_string())
}
