use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::monitoring::types::MonitorStatus;

/// Identity of a monitored endpoint: names are unique per owner
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointKey {
    pub owner: String,
    pub name: String,
}

impl EndpointKey {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self { owner: owner.into(), name: name.into() }
    }
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Monitored endpoint - immutable for its lifetime except for deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredEndpoint {
    pub owner: String,
    pub name: String,
    pub url: String,
    pub interval_seconds: u64,
    /// Substring the response body must contain to be considered UP
    pub expected_content: Option<String>,
}

impl MonitoredEndpoint {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        interval_seconds: u64,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            url: url.into(),
            interval_seconds,
            expected_content: None,
        }
    }

    pub fn with_expected_content(mut self, content: impl Into<String>) -> Self {
        self.expected_content = Some(content.into());
        self
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.owner.clone(), self.name.clone())
    }
}

/// One entry of the append-only transition log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub id: Option<i64>,
    pub key: EndpointKey,
    pub old_status: MonitorStatus,
    pub new_status: MonitorStatus,
    pub checked_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn transition(
        key: EndpointKey,
        old_status: MonitorStatus,
        new_status: MonitorStatus,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self { id: None, key, old_status, new_status, checked_at }
    }

    /// True when this record moves the endpoint into DOWN from anything else
    pub fn is_down_transition(&self) -> bool {
        self.new_status == MonitorStatus::Down && self.old_status != MonitorStatus::Down
    }
}

/// Latest known status of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub status: MonitorStatus,
    pub checked_at: DateTime<Utc>,
}

/// Endpoint paired with its latest status, as shown on a dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOverview {
    pub endpoint: MonitoredEndpoint,
    /// `Unknown` when the endpoint has never been checked
    pub status: MonitorStatus,
    pub checked_at: Option<DateTime<Utc>>,
}

/// Number of an owner's endpoints per latest status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub up: u64,
    pub down: u64,
    pub unknown: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.up + self.down + self.unknown
    }
}

/// Unix milliseconds for storage
pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn i64_to_timestamp(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}
