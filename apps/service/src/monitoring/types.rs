use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::EndpointKey;

/// Believed status of a monitored endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorStatus {
    /// No record exists yet
    #[default]
    Unknown,
    Up,
    Down,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Unknown => "UNKNOWN",
            MonitorStatus::Up => "UP",
            MonitorStatus::Down => "DOWN",
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MonitorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UNKNOWN" => Ok(MonitorStatus::Unknown),
            "UP" => Ok(MonitorStatus::Up),
            "DOWN" => Ok(MonitorStatus::Down),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Why a probe classified an endpoint as DOWN
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProbeFailure {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected status code {0}")]
    UnexpectedStatus(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("expected content {0:?} not found in response body")]
    ContentMismatch(String),
}

/// Result of a single probe. Never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Endpoint that was checked
    pub key: EndpointKey,

    /// URL that was requested
    pub target: String,

    /// When the probe started
    pub timestamp: DateTime<Utc>,

    /// Observed status, never `Unknown` once classified
    pub status: MonitorStatus,

    /// Response time in milliseconds
    pub latency_ms: Option<u64>,

    /// HTTP status code (if a response arrived)
    pub status_code: Option<u16>,

    /// Failure reason for DOWN results
    pub failure: Option<ProbeFailure>,
}

impl CheckResult {
    /// Create an unclassified result
    pub fn new(key: EndpointKey, target: String) -> Self {
        Self {
            key,
            target,
            timestamp: Utc::now(),
            status: MonitorStatus::Unknown,
            latency_ms: None,
            status_code: None,
            failure: None,
        }
    }

    /// Mark the check as successful
    pub fn success(mut self, latency_ms: u64, status_code: u16) -> Self {
        self.status = MonitorStatus::Up;
        self.latency_ms = Some(latency_ms);
        self.status_code = Some(status_code);
        self
    }

    /// Mark the check as failed
    pub fn failure(mut self, failure: ProbeFailure) -> Self {
        self.status = MonitorStatus::Down;
        if let ProbeFailure::UnexpectedStatus(code) = failure {
            self.status_code = Some(code);
        }
        self.failure = Some(failure);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
