use std::time::{Duration, Instant};

use crate::database::models::MonitoredEndpoint;

use super::types::{CheckResult, ProbeFailure};

/// Performs one check against one endpoint.
///
/// Implementations never fail: every failure mode is folded into a DOWN
/// [`CheckResult`] carrying a [`ProbeFailure`].
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, endpoint: &MonitoredEndpoint) -> CheckResult;
}

/// Prober settings
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub timeout_seconds: u64,
    pub user_agent: String,
    /// Accept self-signed or expired certificates instead of reporting DOWN
    pub accept_invalid_certs: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            user_agent: "Mozilla/5.0 (compatible; sitewatch)".into(),
            accept_invalid_certs: false,
        }
    }
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
    timeout_seconds: u64,
}

impl HttpChecker {
    pub fn new(settings: &ProbeSettings) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .user_agent(settings.user_agent.clone())
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()?;

        Ok(Self { client, timeout_seconds: settings.timeout_seconds })
    }

    /// Issue the request and apply the classification rules in order:
    /// transport failure, non-200 status, missing expected content.
    async fn fetch(&self, endpoint: &MonitoredEndpoint) -> Result<u16, ProbeFailure> {
        let response = self
            .client
            .get(&endpoint.url)
            .send()
            .await
            .map_err(|e| self.classify_error(e))?;

        let status_code = response.status().as_u16();
        if status_code != 200 {
            return Err(ProbeFailure::UnexpectedStatus(status_code));
        }

        if let Some(expected) = &endpoint.expected_content {
            let body = response.text().await.map_err(|e| {
                if e.is_timeout() {
                    ProbeFailure::Timeout(self.timeout_seconds)
                } else {
                    ProbeFailure::Body(e.to_string())
                }
            })?;

            if !body.contains(expected.as_str()) {
                return Err(ProbeFailure::ContentMismatch(expected.clone()));
            }
        }

        Ok(status_code)
    }

    fn classify_error(&self, error: reqwest::Error) -> ProbeFailure {
        if error.is_timeout() {
            ProbeFailure::Timeout(self.timeout_seconds)
        } else if error.is_connect() {
            ProbeFailure::Connect(error_chain(&error))
        } else {
            ProbeFailure::Transport(error_chain(&error))
        }
    }
}

/// reqwest hides TLS and DNS details in the source chain
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[async_trait::async_trait]
impl Probe for HttpChecker {
    async fn probe(&self, endpoint: &MonitoredEndpoint) -> CheckResult {
        let result = CheckResult::new(endpoint.key(), endpoint.url.clone());
        let start = Instant::now();
        let outcome = self.fetch(endpoint).await;
        let latency = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(status_code) => result.success(latency, status_code),
            Err(failure) => {
                tracing::warn!(endpoint = %endpoint.key(), url = %endpoint.url, "Probe failed: {}", failure);
                result.failure(failure).with_latency(latency)
            }
        }
    }
}
