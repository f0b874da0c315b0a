//! Registration-time validation of monitored endpoints.
//!
//! Failures here are configuration errors: the endpoint is rejected
//! synchronously and never retried.

use std::net::IpAddr;
use url::Url;

use crate::database::models::MonitoredEndpoint;
use crate::error::ValidationError;

pub const MAX_NAME_LEN: usize = 100;

/// Check intervals accepted when no configuration overrides them
pub const DEFAULT_ALLOWED_INTERVALS: &[u64] = &[10, 30, 60, 300, 600, 1800, 3600];

/// Validation rules applied by the registry on `add`
#[derive(Debug, Clone)]
pub struct EndpointValidator {
    allowed_intervals: Vec<u64>,
    block_private_targets: bool,
}

impl Default for EndpointValidator {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_INTERVALS.to_vec(), false)
    }
}

impl EndpointValidator {
    pub fn new(allowed_intervals: Vec<u64>, block_private_targets: bool) -> Self {
        Self { allowed_intervals, block_private_targets }
    }

    pub fn allowed_intervals(&self) -> &[u64] {
        &self.allowed_intervals
    }

    pub fn validate(&self, endpoint: &MonitoredEndpoint) -> Result<(), ValidationError> {
        validate_name(&endpoint.name)?;
        validate_check_interval(endpoint.interval_seconds, &self.allowed_intervals)?;
        validate_http_target(&endpoint.url, self.block_private_targets)?;

        if let Some(content) = &endpoint.expected_content {
            if content.trim().is_empty() {
                return Err(ValidationError::BlankExpectedContent);
            }
        }

        Ok(())
    }
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong { len, max: MAX_NAME_LEN });
    }

    Ok(())
}

/// Interval must be one of the allow-listed values
pub fn validate_check_interval(
    interval_seconds: u64,
    allowed: &[u64],
) -> Result<(), ValidationError> {
    if allowed.contains(&interval_seconds) {
        Ok(())
    } else {
        Err(ValidationError::IntervalNotAllowed {
            interval: interval_seconds,
            allowed: allowed.to_vec(),
        })
    }
}

/// Validate an HTTP/HTTPS target URL
pub fn validate_http_target(target: &str, block_private: bool) -> Result<(), ValidationError> {
    if target.trim().is_empty() {
        return Err(ValidationError::InvalidUrl("URL cannot be empty".into()));
    }

    let url = Url::parse(target).map_err(|e| {
        if target.contains("://") {
            ValidationError::InvalidUrl(e.to_string())
        } else {
            ValidationError::InvalidUrl("URL must include scheme (http:// or https://)".into())
        }
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
    }

    let Some(host) = url.host_str() else {
        return Err(ValidationError::InvalidUrl("URL must have a valid host".into()));
    };

    if block_private && is_private_or_local(host) {
        return Err(ValidationError::PrivateTarget(host.to_string()));
    }

    if url.port() == Some(0) {
        return Err(ValidationError::InvalidUrl("Port 0 is not valid".into()));
    }

    Ok(())
}

/// Check if hostname/IP is private or localhost
fn is_private_or_local(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ipv4)) => {
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
        }
        Ok(IpAddr::V6(ipv6)) => ipv6.is_loopback() || ipv6.is_unspecified(),
        Err(_) => {
            let host = host.to_ascii_lowercase();
            host.ends_with(".local") || host.ends_with(".internal") || host.ends_with(".localhost")
        }
    }
}
