use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::executor::{AlertOutcome, CheckOutcome, MonitoringExecutor};
use crate::database::Registry;
use crate::database::models::{EndpointKey, MonitoredEndpoint};
use crate::error::StoreError;

/// Elapsed time is compared at this resolution so tick jitter of a few
/// milliseconds does not push a check to the following tick.
const SCHEDULING_TOLERANCE_MS: i64 = 500;

/// Scheduler settings, read once at startup
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tick: Duration,
    pub max_concurrent_checks: usize,
    pub allowed_intervals: Vec<u64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            max_concurrent_checks: 5,
            allowed_intervals: crate::validation::DEFAULT_ALLOWED_INTERVALS.to_vec(),
        }
    }
}

/// Last dispatch time per endpoint, plus the per-endpoint write locks
#[derive(Debug, Default)]
pub struct SchedulerState {
    last_checked: HashMap<EndpointKey, DateTime<Utc>>,
    write_locks: HashMap<EndpointKey, Arc<Mutex<()>>>,
}

impl SchedulerState {
    pub fn last_checked(&self, key: &EndpointKey) -> Option<DateTime<Utc>> {
        self.last_checked.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.last_checked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_checked.is_empty()
    }

    /// Due when never dispatched, or when the interval has elapsed.
    /// Intervals outside the allowed set are never due.
    pub fn is_due(&self, endpoint: &MonitoredEndpoint, now: DateTime<Utc>, allowed: &[u64]) -> bool {
        if !allowed.contains(&endpoint.interval_seconds) {
            return false;
        }

        match self.last_checked.get(&endpoint.key()) {
            None => true,
            Some(last) => {
                let elapsed_ms = (now - *last).num_milliseconds();
                elapsed_ms + SCHEDULING_TOLERANCE_MS >= endpoint.interval_seconds as i64 * 1000
            }
        }
    }

    pub fn mark_checked(&mut self, key: EndpointKey, now: DateTime<Utc>) {
        self.last_checked.insert(key, now);
    }

    pub fn forget(&mut self, key: &EndpointKey) {
        self.last_checked.remove(key);
        self.write_locks.remove(key);
    }

    /// True while a check of `key` holds its write lock
    pub fn in_flight(&self, key: &EndpointKey) -> bool {
        self.write_locks.get(key).is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Pick the due endpoints and stamp them with `now` before they are dispatched,
    /// so an overlapping selection cannot pick them again.
    /// Endpoints with a check still in flight are left for a later tick.
    /// Entries for endpoints no longer in `endpoints` are dropped.
    pub fn select_due(
        &mut self,
        endpoints: &[MonitoredEndpoint],
        now: DateTime<Utc>,
        allowed: &[u64],
    ) -> Vec<MonitoredEndpoint> {
        let live: HashSet<EndpointKey> = endpoints.iter().map(MonitoredEndpoint::key).collect();
        self.last_checked.retain(|key, _| live.contains(key));
        self.write_locks.retain(|key, _| live.contains(key));

        let mut due = Vec::new();
        for endpoint in endpoints {
            if !allowed.contains(&endpoint.interval_seconds) {
                debug!(
                    endpoint = %endpoint.key(),
                    interval = endpoint.interval_seconds,
                    "Skipping endpoint with disallowed interval"
                );
                continue;
            }

            if self.in_flight(&endpoint.key()) {
                debug!(endpoint = %endpoint.key(), "Skipping endpoint with a check still in flight");
                continue;
            }

            if self.is_due(endpoint, now, allowed) {
                self.mark_checked(endpoint.key(), now);
                due.push(endpoint.clone());
            }
        }

        due
    }

    fn write_lock(&mut self, key: &EndpointKey) -> Arc<Mutex<()>> {
        self.write_locks.entry(key.clone()).or_default().clone()
    }
}

/// Summary of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Registry could not be read; nothing was selected
    pub registry_failed: bool,
    pub due: usize,
    pub checked: usize,
    pub transitions: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    /// Endpoints whose reconciliation failed to persist
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, outcome: &Result<CheckOutcome, StoreError>) {
        match outcome {
            Ok(outcome) => {
                self.checked += 1;
                if outcome.transition.is_some() {
                    self.transitions += 1;
                }
                match outcome.alert {
                    AlertOutcome::Sent => self.alerts_sent += 1,
                    AlertOutcome::Failed => self.alerts_failed += 1,
                    AlertOutcome::NotRequired => {}
                }
            }
            Err(_) => self.failed += 1,
        }
    }
}

/// Monitoring scheduler - selects due endpoints each tick and fans them out
/// to a bounded set of concurrent checks
#[derive(Clone)]
pub struct MonitoringScheduler {
    registry: Arc<dyn Registry>,
    executor: Arc<MonitoringExecutor>,
    state: Arc<Mutex<SchedulerState>>,
    settings: Arc<SchedulerSettings>,
}

impl MonitoringScheduler {
    pub fn new(
        registry: Arc<dyn Registry>,
        executor: Arc<MonitoringExecutor>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            registry,
            executor,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn state(&self) -> &Arc<Mutex<SchedulerState>> {
        &self.state
    }

    /// Drive ticks until `shutdown` resolves.
    ///
    /// Ticks never overlap: a tick's checks are all reconciled before the next
    /// selection. Shutdown is observed between ticks, so in-flight checks finish.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut timer = interval(self.settings.tick);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "Scheduler started: tick every {:?}, at most {} concurrent checks",
            self.settings.tick, self.settings.max_concurrent_checks
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested - scheduler stopped");
                    break;
                }
                _ = timer.tick() => {
                    self.run_tick(Utc::now()).await;
                }
            }
        }
    }

    /// Run one selection-and-dispatch cycle as of `now`
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let endpoints = match self.registry.list().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("Failed to load endpoints from registry, retrying next tick: {}", e);
                report.registry_failed = true;
                return report;
            }
        };

        let due = self.state.lock().await.select_due(&endpoints, now, &self.settings.allowed_intervals);
        report.due = due.len();
        if due.is_empty() {
            return report;
        }

        debug!("{} of {} endpoints due", due.len(), endpoints.len());

        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_checks.max(1)));
        let mut tasks = JoinSet::new();

        for endpoint in due {
            // Waiting here keeps at most `max_concurrent_checks` tasks alive
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let scheduler = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                scheduler.process(&endpoint).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!("Check task aborted: {}", e);
                    report.failed += 1;
                }
            }
        }

        if report.transitions > 0 || report.failed > 0 {
            info!(
                "Tick complete: {} checked, {} transitions, {} alerts, {} failed",
                report.checked, report.transitions, report.alerts_sent, report.failed
            );
        } else {
            debug!("Tick complete: {} checked, no changes", report.checked);
        }

        report
    }

    /// Check an endpoint immediately, outside the tick cadence.
    ///
    /// Used right after registration; the endpoint's next scheduled check is
    /// one interval from now.
    pub async fn check_now(&self, endpoint: &MonitoredEndpoint) -> Result<CheckOutcome, StoreError> {
        self.state.lock().await.mark_checked(endpoint.key(), Utc::now());
        self.process(endpoint).await
    }

    /// Drop scheduling state for a deleted endpoint
    pub async fn forget(&self, key: &EndpointKey) {
        self.state.lock().await.forget(key);
    }

    /// Probe and reconcile under the endpoint's write lock, so results of one
    /// endpoint are appended in the order their probes started.
    async fn process(&self, endpoint: &MonitoredEndpoint) -> Result<CheckOutcome, StoreError> {
        let lock = self.state.lock().await.write_lock(&endpoint.key());
        let _guard = lock.lock().await;

        let result = self.executor.execute_check(endpoint).await;

        self.executor.reconcile(endpoint, &result).await.inspect_err(|e| {
            error!(endpoint = %endpoint.key(), "Failed to record check result: {}", e);
        })
    }
}
