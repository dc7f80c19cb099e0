use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::gate::{GateError, ProjectStatus, ProjectStatusSource, StatusFetch};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const GATE_TIMEOUT: Duration = Duration::from_secs(15);

/// Minimal client for the SonarQube web API endpoints used during a run.
#[derive(Debug, Clone)]
pub struct SonarClient {
    http: Client,
    base: String,
    token: String,
}

/// Outcome of the best-effort reachability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable(SystemStatus),
    Unexpected(u16),
    Unreachable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Deserialize)]
struct AuthenticationResponse {
    #[serde(default)]
    valid: Option<bool>,
}

#[derive(Deserialize)]
struct ProjectStatusResponse {
    #[serde(rename = "projectStatus", default)]
    project_status: Option<ProjectStatus>,
}

impl SonarClient {
    pub fn new(host_url: &str, token: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("sonar-gate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build analysis server HTTP client")?;
        Ok(Self {
            http,
            base: host_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// `GET /api/system/status`, unauthenticated. Never fails the run.
    pub async fn probe(&self) -> ProbeOutcome {
        let response = self
            .http
            .get(self.url("/api/system/status"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        let response = match response {
            Ok(resp) => resp,
            Err(err) => return ProbeOutcome::Unreachable(err.to_string()),
        };
        if response.status() != StatusCode::OK {
            return ProbeOutcome::Unexpected(response.status().as_u16());
        }
        // An unreadable body still proves the server is up.
        let status = response.json::<SystemStatus>().await.unwrap_or_default();
        ProbeOutcome::Reachable(status)
    }

    /// `GET /api/authentication/validate` with the bearer token.
    pub async fn validate_authentication(&self) -> Result<(), GateError> {
        let response = self
            .http
            .get(self.url("/api/authentication/validate"))
            .bearer_auth(&self.token)
            .timeout(AUTH_TIMEOUT)
            .send()
            .await
            .map_err(|err| GateError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GateError::UnexpectedStatus(status.as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|err| GateError::Transport(err.to_string()))?;
        let parsed: AuthenticationResponse = serde_json::from_str(&body)
            .map_err(|err| GateError::UnparseableResponse(err.to_string()))?;
        match parsed.valid {
            Some(true) => Ok(()),
            _ => Err(GateError::InvalidToken),
        }
    }
}

#[async_trait]
impl ProjectStatusSource for SonarClient {
    async fn fetch_project_status(&self, project_key: &str) -> StatusFetch {
        let response = self
            .http
            .get(self.url("/api/qualitygates/project_status"))
            .query(&[("projectKey", project_key)])
            .bearer_auth(&self.token)
            .timeout(GATE_TIMEOUT)
            .send()
            .await;
        let response = match response {
            Ok(resp) => resp,
            Err(err) => return StatusFetch::Transport(err.to_string()),
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::FORBIDDEN => return StatusFetch::Forbidden,
            StatusCode::NOT_FOUND => return StatusFetch::NotFound,
            other => return StatusFetch::Unexpected(other.as_u16()),
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return StatusFetch::Transport(err.to_string()),
        };
        debug!(%body, "quality gate response");
        match serde_json::from_str::<ProjectStatusResponse>(&body) {
            Ok(parsed) => StatusFetch::Ready(parsed.project_status.unwrap_or_default()),
            Err(err) => StatusFetch::Unparseable(err.to_string()),
        }
    }
}
