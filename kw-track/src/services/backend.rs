//! Scraper backend client
//!
//! kw-track never talks to the listing site itself; the scraper backend
//! does the fetching, matching, and storage. This module is the only place
//! that knows the backend's wire shapes. The `ScraperBackend` trait is the
//! seam the JobTracker and DuplicateResolver are written against, so both
//! can be driven by a stub in tests.

use async_trait::async_trait;
use kw_common::events::{JobState, StepState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::models::availability::RawRoomHistory;
use crate::models::duplicate::DuplicateCandidateSet;
use crate::services::change_aggregator::RawChangeBatch;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("kamerwatch/", env!("CARGO_PKG_VERSION"));

/// Scraper backend client errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// The backend does not support the requested operation in this
    /// context (404/501 on an action endpoint)
    #[error("Operation not supported by backend")]
    Unsupported,

    #[error("Response decode error: {0}")]
    Decode(String),
}

/// `POST analyze` request body
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest<'a> {
    pub url: &'a str,
    /// Bypass duplicate detection and force a new property record
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force_new: bool,
}

/// `POST analyze` response
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    /// Job token when the backend started (or auto-linked into) an analysis
    #[serde(default, alias = "jobId")]
    pub job_id: Option<String>,

    /// True when the matcher flagged the submission as a possible duplicate
    #[serde(default)]
    pub duplicate_detected: bool,

    /// Candidate set accompanying a duplicate flag
    #[serde(default)]
    pub duplicate_data: Option<DuplicateCandidateSet>,
}

/// `GET analysis/{job_id}` response
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    /// Job state as the backend sees it
    pub status: JobState,

    /// Sub-step progress map, when the job is running
    #[serde(default)]
    pub progress: Option<BTreeMap<String, StepState>>,

    /// Error text for failed jobs
    #[serde(default)]
    pub error: Option<String>,
}

/// `POST properties/{id}/link-url` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkUrlResponse {
    /// Job token when the link itself triggered a re-scrape (usually absent)
    #[serde(default, alias = "jobId")]
    pub job_id: Option<String>,
}

/// `POST duplicate-actions/add-separate-room` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddRoomResponse {
    /// Job token for the new room's analysis, when one was started
    #[serde(default, alias = "jobId")]
    pub job_id: Option<String>,
}

/// Availability timeline read model for one property
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityTimelineResponse {
    #[serde(default)]
    pub rooms: Vec<RawRoomHistory>,
}

/// Seam between kw-track and the scraper backend
#[async_trait]
pub trait ScraperBackend: Send + Sync {
    /// Submit a listing URL for (re-)analysis
    async fn submit_analysis(
        &self,
        url: &str,
        force_new: bool,
    ) -> Result<AnalyzeResponse, BackendError>;

    /// Fetch the current status of an analysis job
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, BackendError>;

    /// Link an additional listing URL onto an existing property
    async fn link_url(
        &self,
        property_id: &str,
        new_url: &str,
    ) -> Result<LinkUrlResponse, BackendError>;

    /// Register a new room under an existing property's building identity
    async fn add_separate_room(
        &self,
        property_id: &str,
        new_url: &str,
    ) -> Result<AddRoomResponse, BackendError>;

    /// Raw change feed for one property
    async fn change_feed(
        &self,
        property_id: &str,
        days: Option<u32>,
    ) -> Result<RawChangeBatch, BackendError>;

    /// Raw availability timeline for one property
    async fn availability_timeline(
        &self,
        property_id: &str,
        days: Option<u32>,
    ) -> Result<AvailabilityTimelineResponse, BackendError>;
}

/// HTTP implementation of [`ScraperBackend`]
pub struct HttpScraperBackend {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpScraperBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Decode a response, mapping non-success statuses to `BackendError`.
    ///
    /// `unsupported_statuses` lists HTTP statuses that mean "this backend
    /// cannot do that here" for the endpoint at hand.
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        unsupported_statuses: &[u16],
    ) -> Result<T, BackendError> {
        let status = response.status().as_u16();

        if unsupported_statuses.contains(&status) {
            return Err(BackendError::Unsupported);
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ScraperBackend for HttpScraperBackend {
    async fn submit_analysis(
        &self,
        url: &str,
        force_new: bool,
    ) -> Result<AnalyzeResponse, BackendError> {
        tracing::debug!(url = %url, force_new, "Submitting analysis to backend");

        let response = self
            .http_client
            .post(self.url("analyze"))
            .json(&AnalyzeRequest { url, force_new })
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Self::decode(response, &[]).await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, BackendError> {
        let response = self
            .http_client
            .get(self.url(&format!("analysis/{}", job_id)))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Self::decode(response, &[]).await
    }

    async fn link_url(
        &self,
        property_id: &str,
        new_url: &str,
    ) -> Result<LinkUrlResponse, BackendError> {
        tracing::info!(property_id = %property_id, url = %new_url, "Linking URL onto existing property");

        let response = self
            .http_client
            .post(self.url(&format!("properties/{}/link-url", property_id)))
            .json(&serde_json::json!({ "new_url": new_url }))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Self::decode(response, &[]).await
    }

    async fn add_separate_room(
        &self,
        property_id: &str,
        new_url: &str,
    ) -> Result<AddRoomResponse, BackendError> {
        tracing::info!(property_id = %property_id, url = %new_url, "Registering separate room");

        let response = self
            .http_client
            .post(self.url("duplicate-actions/add-separate-room"))
            .json(&serde_json::json!({
                "property_id": property_id,
                "new_url": new_url,
            }))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        // A backend without the separate-room handler answers 404/501 here;
        // the resolver turns that into the documented fallback.
        Self::decode(response, &[404, 501]).await
    }

    async fn change_feed(
        &self,
        property_id: &str,
        days: Option<u32>,
    ) -> Result<RawChangeBatch, BackendError> {
        let mut url = self.url(&format!("properties/{}/price-trends", property_id));
        if let Some(days) = days {
            url = format!("{}?days={}", url, days);
        }

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Self::decode(response, &[]).await
    }

    async fn availability_timeline(
        &self,
        property_id: &str,
        days: Option<u32>,
    ) -> Result<AvailabilityTimelineResponse, BackendError> {
        let mut url = self.url(&format!("properties/{}/availability-timeline", property_id));
        if let Some(days) = days {
            url = format!("{}?days={}", url, days);
        }

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Self::decode(response, &[]).await
    }
}
