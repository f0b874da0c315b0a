use std::sync::Arc;

use tracing::{debug, info, warn};

use super::checker::Probe;
use super::types::{CheckResult, MonitorStatus};
use crate::database::StatusStore;
use crate::database::models::{EndpointKey, MonitoredEndpoint, StatusRecord};
use crate::error::StoreError;
use crate::notify::{DownAlert, Notifier};

/// What happened to the alert for a reconciled check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// No transition into DOWN
    NotRequired,
    Sent,
    /// Delivery failed; the transition record was still written
    Failed,
}

/// Result of reconciling one check against the status log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub key: EndpointKey,
    pub observed: MonitorStatus,
    /// Record appended for this check, `None` when the status did not change
    pub transition: Option<StatusRecord>,
    pub alert: AlertOutcome,
}

/// Monitoring executor - runs the probe, reconcile and notify steps for one endpoint
pub struct MonitoringExecutor {
    prober: Arc<dyn Probe>,
    store: Arc<dyn StatusStore>,
    notifier: Arc<dyn Notifier>,
}

impl MonitoringExecutor {
    pub fn new(
        prober: Arc<dyn Probe>,
        store: Arc<dyn StatusStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { prober, store, notifier }
    }

    /// Execute a monitoring check. Never fails.
    pub async fn execute_check(&self, endpoint: &MonitoredEndpoint) -> CheckResult {
        self.prober.probe(endpoint).await
    }

    /// Compare a check against the last recorded status and persist a transition.
    ///
    /// The record is appended before the notifier runs; a notifier failure is
    /// logged and reported in the outcome, never returned as an error. Callers
    /// must serialize reconciliation per endpoint.
    pub async fn reconcile(
        &self,
        endpoint: &MonitoredEndpoint,
        result: &CheckResult,
    ) -> Result<CheckOutcome, StoreError> {
        let key = endpoint.key();
        let observed = result.status;
        let mut outcome =
            CheckOutcome { key: key.clone(), observed, transition: None, alert: AlertOutcome::NotRequired };

        if observed == MonitorStatus::Unknown {
            warn!(endpoint = %key, "Discarding unclassified check result");
            return Ok(outcome);
        }

        let previous = self.store.last_status(&key).await?;
        if previous == observed {
            debug!(endpoint = %key, status = %observed, "Status unchanged");
            return Ok(outcome);
        }

        let mut record = StatusRecord::transition(key.clone(), previous, observed, result.timestamp);
        record.id = Some(self.store.append(&record).await?);

        info!(
            endpoint = %key,
            url = %endpoint.url,
            status_code = ?result.status_code,
            reason = %result.failure.as_ref().map(ToString::to_string).unwrap_or_default(),
            "Status changed: {} -> {}",
            previous,
            observed
        );

        if record.is_down_transition() {
            let alert = DownAlert::new(endpoint, result.timestamp);
            outcome.alert = match self.notifier.notify_down(&alert).await {
                Ok(()) => {
                    info!(endpoint = %key, channel = self.notifier.name(), "DOWN alert sent");
                    AlertOutcome::Sent
                }
                Err(e) => {
                    warn!(endpoint = %key, channel = self.notifier.name(), "Failed to send DOWN alert: {}", e);
                    AlertOutcome::Failed
                }
            };
        }

        outcome.transition = Some(record);
        Ok(outcome)
    }
}
