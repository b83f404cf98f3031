//! HTTP client for the remote telemetry source.
//!
//! One `fetch` is one GET against `/v2/monitor/{id}`. Failures come back as
//! `FetchError` values; retrying is left to the poller's next round.

use crate::source::types::{MonitorResponse, ShapeError, Snapshot, SubjectId, SubjectProfile};
use async_trait::async_trait;
use std::time::Duration;

/// Where and how to reach the telemetry source.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Base URL, e.g. `http://tesla.iem.pw.edu.pl:9080`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl SourceConfig {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }

    /// URL of one subject's monitor endpoint.
    pub fn monitor_url(&self, subject_id: SubjectId) -> String {
        format!(
            "{}/v2/monitor/{}",
            self.base_url.trim_end_matches('/'),
            subject_id
        )
    }
}

/// Fetch error types.
#[derive(Debug)]
pub enum FetchError {
    /// Transport failure or timeout
    Network(String),
    /// Source answered with a non-success status
    Status { status: u16, message: String },
    /// Body was not the expected JSON shape
    Malformed(String),
}

impl FetchError {
    /// Whether the source answered with a body of the wrong shape.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FetchError::Malformed(_))
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Network(msg) => write!(f, "Source network error: {msg}"),
            FetchError::Status { status, message } => {
                write!(f, "Source returned status {status}: {message}")
            }
            FetchError::Malformed(msg) => write!(f, "Malformed snapshot: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<ShapeError> for FetchError {
    fn from(e: ShapeError) -> Self {
        FetchError::Malformed(e.to_string())
    }
}

/// Anything that can produce a subject's current snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current sensor snapshot of one subject.
    async fn fetch(&self, subject_id: SubjectId) -> Result<Snapshot, FetchError>;

    /// Fetch the person details of one subject.
    async fn fetch_profile(&self, subject_id: SubjectId) -> Result<SubjectProfile, FetchError>;
}

/// `SnapshotSource` backed by the real HTTP endpoint.
pub struct HttpSource {
    config: SourceConfig,
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a new HTTP source.
    pub fn new(config: SourceConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn get_monitor(&self, subject_id: SubjectId) -> Result<MonitorResponse, FetchError> {
        let response = self
            .client
            .get(self.config.monitor_url(subject_id))
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl SnapshotSource for HttpSource {
    async fn fetch(&self, subject_id: SubjectId) -> Result<Snapshot, FetchError> {
        let response = self.get_monitor(subject_id).await?;
        Ok(Snapshot::from_trace(subject_id, response.trace)?)
    }

    async fn fetch_profile(&self, subject_id: SubjectId) -> Result<SubjectProfile, FetchError> {
        let response = self.get_monitor(subject_id).await?;
        Ok(SubjectProfile::from_response(subject_id, &response))
    }
}
