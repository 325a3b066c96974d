use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::models::SessionKind;

pub const DEVIN_API_BASE: &str = "https://api.devin.ai/v1";
pub const DEVIN_APP_BASE: &str = "https://app.devin.ai";
/// Upper bound on a single Devin HTTP round trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bookkeeping attached to a session so it can be traced back to an issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMetadata {
    pub issue_number: i64,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateSessionRequest {
    pub prompt: String,
    pub metadata: SessionMetadata,
}

impl CreateSessionRequest {
    pub fn new(prompt: String, issue_number: i64, kind: SessionKind) -> Self {
        Self {
            prompt,
            metadata: SessionMetadata {
                issue_number,
                kind,
                analysis_session_id: None,
            },
        }
    }

    pub fn with_analysis_session(mut self, session_id: &str) -> Self {
        self.metadata.analysis_session_id = Some(session_id.to_string());
        self
    }
}

/// The remote coding agent. Payloads are returned raw: their shape is not
/// stable, so interpretation is left to the status normalizer and extractor.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<serde_json::Value>;

    async fn fetch_session(&self, session_id: &str) -> Result<serde_json::Value>;

    /// Browser link for a session.
    fn session_url(&self, session_id: &str) -> String;
}

/// REST client for the Devin sessions API.
#[derive(Debug, Clone)]
pub struct DevinClient {
    http: reqwest::Client,
    api_base: String,
    app_base: String,
    api_key: String,
}

impl DevinClient {
    pub fn new(api_base: &str, app_base: &str, api_key: &str) -> Result<Self> {
        Self::with_request_timeout(api_base, app_base, api_key, REQUEST_TIMEOUT)
    }

    pub fn with_request_timeout(
        api_base: &str,
        app_base: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Devin HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_base: app_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn sessions_url(&self) -> String {
        format!("{}/sessions", self.api_base)
    }
}

#[async_trait]
impl AgentService for DevinClient {
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<serde_json::Value> {
        info!(
            issue = request.metadata.issue_number,
            kind = %request.metadata.kind,
            "Creating Devin session"
        );
        let response: serde_json::Value = self
            .http
            .post(self.sessions_url())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .context("Failed to send create-session request to Devin")?
            .error_for_status()
            .context("Devin rejected create-session request")?
            .json()
            .await
            .context("Failed to parse create-session response from Devin")?;
        Ok(response)
    }

    async fn fetch_session(&self, session_id: &str) -> Result<serde_json::Value> {
        debug!(session_id, "Fetching Devin session");
        self.http
            .get(format!("{}/{}", self.sessions_url(), session_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .with_context(|| format!("Failed to fetch Devin session {}", session_id))?
            .error_for_status()
            .with_context(|| format!("Devin returned error status for session {}", session_id))?
            .json()
            .await
            .with_context(|| format!("Failed to parse Devin session {}", session_id))
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/sessions/{}", self.app_base, session_id)
    }
}
