use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::settings::{DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};

/// Terminal outcome of quality-gate polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Passed,
    Warned,
    Failed,
    Unknown,
}

impl GateStatus {
    /// Map the server's `projectStatus.status` value. `ERROR` and `WARN` are
    /// the only values that do not pass.
    pub fn from_server_value(value: &str) -> Self {
        match value {
            "ERROR" => Self::Failed,
            "WARN" => Self::Warned,
            _ => Self::Passed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Warned => "warned",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

/// One metric condition evaluated by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateCondition {
    pub status: String,
    pub metric_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_threshold: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<String>,
}

/// `projectStatus` object of the project status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_conditions")]
    pub conditions: Vec<GateCondition>,
}

/// Conditions never decide the verdict, so a null list or a malformed entry
/// is dropped instead of failing the whole response.
fn lenient_conditions<'de, D>(deserializer: D) -> Result<Vec<GateCondition>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::Array(items)) = raw else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<GateCondition>(item) {
            Ok(condition) => Some(condition),
            Err(err) => {
                debug!(error = %err, "skipping malformed quality gate condition");
                None
            }
        })
        .collect())
}

/// Result of a single project-status request, classified for the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFetch {
    /// HTTP 200 with a parsed body.
    Ready(ProjectStatus),
    Forbidden,
    NotFound,
    /// 200 whose body could not be parsed.
    Unparseable(String),
    Unexpected(u16),
    Transport(String),
}

/// Final verdict handed to the reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateReport {
    pub project_key: String,
    pub status: GateStatus,
    pub attempts: u32,
    pub conditions: Vec<GateCondition>,
}

impl GateReport {
    /// Conditions worth showing for this verdict: failed conditions for a
    /// failed gate, warnings for a warned gate, nothing otherwise.
    pub fn relevant_conditions(&self) -> impl Iterator<Item = &GateCondition> {
        let wanted = match self.status {
            GateStatus::Failed => Some("ERROR"),
            GateStatus::Warned => Some("WARN"),
            GateStatus::Passed | GateStatus::Unknown => None,
        };
        self.conditions
            .iter()
            .filter(move |c| wanted.is_some_and(|w| c.status == w))
    }
}

/// Errors raised while talking to the server about authentication or the gate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("request to the analysis server failed: {0}")]
    Transport(String),
    #[error("analysis server answered HTTP {0} to the authentication check")]
    UnexpectedStatus(u16),
    #[error("could not parse analysis server response: {0}")]
    UnparseableResponse(String),
    #[error("the configured token was rejected by the analysis server")]
    InvalidToken,
    #[error("access to the quality gate of `{project_key}` was denied (HTTP 403)")]
    Forbidden { project_key: String },
}

/// Anything that can report the quality-gate status of a project.
#[async_trait]
pub trait ProjectStatusSource: Send + Sync {
    async fn fetch_project_status(&self, project_key: &str) -> StatusFetch;
}

/// Fixed-interval poller for the quality-gate verdict.
#[derive(Debug, Clone)]
pub struct QualityGatePoller {
    max_attempts: u32,
    interval: Duration,
}

impl Default for QualityGatePoller {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL)
    }
}

impl QualityGatePoller {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Poll until the server reports a verdict or the attempts run out.
    ///
    /// HTTP 403 aborts immediately. A null status, 404, any other status and
    /// transport failures are retried after the fixed interval. Exhausting
    /// every attempt yields [`GateStatus::Unknown`].
    pub async fn poll(
        &self,
        source: &dyn ProjectStatusSource,
        project_key: &str,
    ) -> Result<GateReport, GateError> {
        for attempt in 1..=self.max_attempts {
            info!(attempt, max = self.max_attempts, "checking quality gate status");
            match source.fetch_project_status(project_key).await {
                StatusFetch::Ready(ProjectStatus {
                    status: Some(value),
                    conditions,
                }) => {
                    let status = GateStatus::from_server_value(&value);
                    debug!(
                        server_status = %value,
                        status = status.as_str(),
                        "quality gate resolved"
                    );
                    return Ok(GateReport {
                        project_key: project_key.to_string(),
                        status,
                        attempts: attempt,
                        conditions,
                    });
                }
                StatusFetch::Ready(ProjectStatus { status: None, .. }) => {
                    info!("analysis is still being processed");
                }
                StatusFetch::Forbidden => {
                    return Err(GateError::Forbidden {
                        project_key: project_key.to_string(),
                    });
                }
                StatusFetch::NotFound => {
                    info!("project status not found yet; the analysis may not be indexed");
                }
                StatusFetch::Unparseable(reason) => {
                    warn!(%reason, "could not parse quality gate response");
                }
                StatusFetch::Unexpected(code) => {
                    warn!(code, "unexpected HTTP status from quality gate endpoint");
                }
                StatusFetch::Transport(reason) => {
                    warn!(%reason, "quality gate request failed");
                }
            }

            if attempt < self.max_attempts {
                sleep(self.interval).await;
            }
        }

        warn!(
            attempts = self.max_attempts,
            "quality gate status still unknown after all attempts"
        );
        Ok(GateReport {
            project_key: project_key.to_string(),
            status: GateStatus::Unknown,
            attempts: self.max_attempts,
            conditions: Vec::new(),
        })
    }
}
