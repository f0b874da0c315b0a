/// Scheduler scenarios against in-memory registry, store, prober and notifier
///
/// These cover transition-only persistence, alert firing, interval handling,
/// bounded fan-out and per-endpoint isolation of failures.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use super::checker::Probe;
use super::executor::{AlertOutcome, MonitoringExecutor};
use super::scheduler::{MonitoringScheduler, SchedulerSettings};
use super::types::{CheckResult, MonitorStatus, ProbeFailure};
use crate::database::models::{
    EndpointKey, MonitoredEndpoint, StatusCounts, StatusRecord, StatusSummary,
};
use crate::database::{Registry, StatusStore};
use crate::error::{NotifyError, RegistryError, StoreError};
use crate::notify::{DownAlert, Notifier};
use crate::validation::EndpointValidator;

#[derive(Default)]
struct MemoryRegistry {
    endpoints: RwLock<Vec<MonitoredEndpoint>>,
    unavailable: AtomicBool,
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn list(&self) -> Result<Vec<MonitoredEndpoint>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("registry offline".into()));
        }
        Ok(self.endpoints.read().unwrap().clone())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<MonitoredEndpoint>, StoreError> {
        Ok(self.list().await?.into_iter().filter(|e| e.owner == owner).collect())
    }

    async fn add(&self, endpoint: &MonitoredEndpoint) -> Result<(), RegistryError> {
        EndpointValidator::default().validate(endpoint)?;
        self.endpoints.write().unwrap().push(endpoint.clone());
        Ok(())
    }

    async fn remove(&self, key: &EndpointKey) -> Result<bool, StoreError> {
        let mut endpoints = self.endpoints.write().unwrap();
        let before = endpoints.len();
        endpoints.retain(|e| &e.key() != key);
        Ok(endpoints.len() != before)
    }
}

#[derive(Default)]
struct MemoryStatusStore {
    records: Mutex<Vec<StatusRecord>>,
    /// Appends for these endpoint names fail
    failing: Mutex<Vec<String>>,
}

impl MemoryStatusStore {
    fn records_for(&self, name: &str) -> Vec<StatusRecord> {
        self.records.lock().unwrap().iter().filter(|r| r.key.name == name).cloned().collect()
    }

    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn append(&self, record: &StatusRecord) -> Result<i64, StoreError> {
        if self.failing.lock().unwrap().contains(&record.key.name) {
            return Err(StoreError::Corrupt("disk full".into()));
        }
        // Widen the window between read-last and append
        tokio::task::yield_now().await;
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        Ok(records.len() as i64)
    }

    async fn latest_summary(&self, key: &EndpointKey) -> Result<Option<StatusSummary>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| &r.key == key)
            .map(|r| StatusSummary { status: r.new_status, checked_at: r.checked_at }))
    }

    async fn history(&self, key: &EndpointKey, limit: usize) -> Result<Vec<StatusRecord>, StoreError> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().rev().filter(|r| &r.key == key).take(limit).cloned().collect())
    }

    async fn status_counts(&self, _owner: &str) -> Result<StatusCounts, StoreError> {
        Ok(StatusCounts::default())
    }
}

/// Returns scripted statuses per endpoint name, then `fallback`
struct ScriptedProbe {
    scripts: Mutex<HashMap<String, VecDeque<MonitorStatus>>>,
    fallback: MonitorStatus,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProbe {
    fn new(fallback: MonitorStatus) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn script(self, name: &str, statuses: &[MonitorStatus]) -> Self {
        self.scripts.lock().unwrap().insert(name.to_string(), statuses.iter().copied().collect());
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, endpoint: &MonitoredEndpoint) -> CheckResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let status = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&endpoint.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.fallback);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let result = CheckResult::new(endpoint.key(), endpoint.url.clone());
        match status {
            MonitorStatus::Down => result.failure(ProbeFailure::UnexpectedStatus(500)),
            _ => result.success(1, 200),
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    alerts: Mutex<Vec<DownAlert>>,
    broken: bool,
}

impl RecordingNotifier {
    fn broken() -> Self {
        Self { broken: true, ..Self::default() }
    }

    fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_down(&self, alert: &DownAlert) -> Result<(), NotifyError> {
        self.alerts.lock().unwrap().push(alert.clone());
        if self.broken {
            return Err(NotifyError::Rejected(502));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct Harness {
    registry: Arc<MemoryRegistry>,
    store: Arc<MemoryStatusStore>,
    probe: Arc<ScriptedProbe>,
    notifier: Arc<RecordingNotifier>,
    scheduler: MonitoringScheduler,
}

fn harness(probe: ScriptedProbe, notifier: RecordingNotifier, max_concurrent_checks: usize) -> Harness {
    let registry = Arc::new(MemoryRegistry::default());
    let store = Arc::new(MemoryStatusStore::default());
    let probe = Arc::new(probe);
    let notifier = Arc::new(notifier);

    let executor = Arc::new(MonitoringExecutor::new(probe.clone(), store.clone(), notifier.clone()));
    let settings = SchedulerSettings {
        tick: Duration::from_millis(20),
        max_concurrent_checks,
        allowed_intervals: vec![10, 30, 60],
    };
    let scheduler = MonitoringScheduler::new(registry.clone(), executor, settings);

    Harness { registry, store, probe, notifier, scheduler }
}

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

fn site(name: &str, interval: u64) -> MonitoredEndpoint {
    MonitoredEndpoint::new("alice", name, format!("https://{name}.example.com"), interval)
}

use MonitorStatus::{Down, Unknown, Up};

#[tokio::test]
async fn test_transition_scenario() {
    let h = harness(
        ScriptedProbe::new(Up).script("example", &[Up, Down, Down, Up]),
        RecordingNotifier::default(),
        5,
    );
    h.registry.add(&site("example", 10)).await.unwrap();

    // t=0: baseline UP, no alert
    let report = h.scheduler.run_tick(at(0)).await;
    assert_eq!((report.due, report.transitions, report.alerts_sent), (1, 1, 0));

    // t=10: UP -> DOWN, alert
    let report = h.scheduler.run_tick(at(10)).await;
    assert_eq!((report.due, report.transitions, report.alerts_sent), (1, 1, 1));

    // t=15: not due
    let report = h.scheduler.run_tick(at(15)).await;
    assert_eq!(report.due, 0);
    assert_eq!(h.probe.calls(), 2);

    // t=20: still DOWN, nothing written
    let report = h.scheduler.run_tick(at(20)).await;
    assert_eq!((report.due, report.transitions, report.alerts_sent), (1, 0, 0));

    // t=30: DOWN -> UP, no alert
    let report = h.scheduler.run_tick(at(30)).await;
    assert_eq!((report.due, report.transitions, report.alerts_sent), (1, 1, 0));

    let transitions: Vec<_> =
        h.store.records_for("example").iter().map(|r| (r.old_status, r.new_status)).collect();
    assert_eq!(transitions, vec![(Unknown, Up), (Up, Down), (Down, Up)]);
    assert_eq!(h.notifier.count(), 1);
    assert_eq!(h.probe.calls(), 4);
}

#[tokio::test]
async fn test_baseline_down_alerts_once() {
    let h = harness(ScriptedProbe::new(Down), RecordingNotifier::default(), 5);
    h.registry.add(&site("broken", 10)).await.unwrap();

    for t in [0, 10, 20, 30] {
        h.scheduler.run_tick(at(t)).await;
    }

    let records = h.store.records_for("broken");
    assert_eq!(records.len(), 1);
    assert_eq!((records[0].old_status, records[0].new_status), (Unknown, Down));

    let alerts = h.notifier.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].name, "broken");
    assert_eq!(alerts[0].url, "https://broken.example.com");
    assert_eq!(alerts[0].status, Down);
}

#[tokio::test]
async fn test_repeated_status_writes_once() {
    let h = harness(ScriptedProbe::new(Up), RecordingNotifier::default(), 5);
    h.registry.add(&site("steady", 10)).await.unwrap();

    for i in 0..20 {
        h.scheduler.run_tick(at(i * 10)).await;
    }

    assert_eq!(h.probe.calls(), 20);
    assert_eq!(h.store.records_for("steady").len(), 1);
    assert_eq!(h.notifier.count(), 0);
}

#[tokio::test]
async fn test_alerts_match_down_transitions() {
    let script = [Up, Up, Down, Down, Up, Down, Up, Up, Down, Down, Down, Up];
    let h = harness(ScriptedProbe::new(Up).script("flappy", &script), RecordingNotifier::default(), 5);
    h.registry.add(&site("flappy", 10)).await.unwrap();

    for i in 0..script.len() as i64 {
        h.scheduler.run_tick(at(i * 10)).await;
    }

    let records = h.store.records_for("flappy");
    let down_transitions = records.iter().filter(|r| r.is_down_transition()).count();
    assert_eq!(records.len(), 7);
    assert_eq!(down_transitions, 3);
    assert_eq!(h.notifier.count(), down_transitions);

    // Consecutive records chain: each starts where the previous ended
    for pair in records.windows(2) {
        assert_eq!(pair[0].new_status, pair[1].old_status);
        assert_ne!(pair[1].old_status, pair[1].new_status);
    }
}

#[tokio::test]
async fn test_disallowed_interval_never_probed() {
    let h = harness(ScriptedProbe::new(Up), RecordingNotifier::default(), 5);
    // Bypass validation the way a hand-edited database row would
    h.registry.endpoints.write().unwrap().push(site("odd", 45));

    for t in (0..=600).step_by(5) {
        assert_eq!(h.scheduler.run_tick(at(t)).await.due, 0);
    }
    assert_eq!(h.probe.calls(), 0);
    assert_eq!(h.store.len(), 0);
}

#[tokio::test]
async fn test_bounded_fan_out() {
    let h = harness(
        ScriptedProbe::new(Up).with_delay(Duration::from_millis(20)),
        RecordingNotifier::default(),
        5,
    );
    for i in 0..50 {
        h.registry.add(&site(&format!("site-{i}"), 30)).await.unwrap();
    }

    let report = h.scheduler.run_tick(at(0)).await;

    assert_eq!(report.due, 50);
    assert_eq!(report.checked, 50);
    assert_eq!(h.probe.calls(), 50);
    assert!(h.probe.max_in_flight.load(Ordering::SeqCst) <= 5);
    assert!(h.store.len() <= 50);

    for i in 0..50 {
        let records = h.store.records_for(&format!("site-{i}"));
        assert_eq!(records.len(), 1);
        assert!(records.windows(2).all(|w| w[0].checked_at <= w[1].checked_at));
    }
}

#[tokio::test]
async fn test_registry_failure_is_retried_next_tick() {
    let h = harness(ScriptedProbe::new(Up), RecordingNotifier::default(), 5);
    h.registry.add(&site("example", 10)).await.unwrap();

    h.registry.unavailable.store(true, Ordering::SeqCst);
    let report = h.scheduler.run_tick(at(0)).await;
    assert!(report.registry_failed);
    assert_eq!(h.probe.calls(), 0);

    h.registry.unavailable.store(false, Ordering::SeqCst);
    let report = h.scheduler.run_tick(at(5)).await;
    assert!(!report.registry_failed);
    assert_eq!(report.checked, 1);
}

#[tokio::test]
async fn test_store_failure_isolated_to_endpoint() {
    let h = harness(ScriptedProbe::new(Down), RecordingNotifier::default(), 5);
    for name in ["a", "b", "c"] {
        h.registry.add(&site(name, 10)).await.unwrap();
    }
    h.store.failing.lock().unwrap().push("b".into());

    let report = h.scheduler.run_tick(at(0)).await;
    assert_eq!((report.checked, report.failed, report.transitions), (2, 1, 2));
    assert!(h.store.records_for("b").is_empty());
    // No record, so no alert either
    assert_eq!(h.notifier.count(), 2);

    // Store recovers; the baseline is written on the next due tick
    h.store.failing.lock().unwrap().clear();
    let report = h.scheduler.run_tick(at(10)).await;
    assert_eq!(report.transitions, 1);
    assert_eq!(h.store.records_for("b").len(), 1);
    assert_eq!(h.notifier.count(), 3);
}

#[tokio::test]
async fn test_notifier_failure_keeps_record() {
    let h = harness(ScriptedProbe::new(Down), RecordingNotifier::broken(), 5);
    h.registry.add(&site("a", 10)).await.unwrap();
    h.registry.add(&site("b", 10)).await.unwrap();

    let report = h.scheduler.run_tick(at(0)).await;

    assert_eq!(report.alerts_failed, 2);
    assert_eq!(report.alerts_sent, 0);
    assert_eq!(report.transitions, 2);
    assert_eq!(h.store.records_for("a").len(), 1);
    assert_eq!(h.store.records_for("b").len(), 1);

    // Not retried on later polls of the same DOWN state
    h.scheduler.run_tick(at(10)).await;
    assert_eq!(h.notifier.count(), 2);
}

#[tokio::test]
async fn test_check_now_defers_next_tick() {
    let h = harness(ScriptedProbe::new(Up), RecordingNotifier::default(), 5);
    let endpoint = site("fresh", 60);
    h.registry.add(&endpoint).await.unwrap();

    let outcome = h.scheduler.check_now(&endpoint).await.unwrap();
    assert_eq!(outcome.observed, Up);
    assert_eq!(outcome.alert, AlertOutcome::NotRequired);
    assert_eq!(outcome.transition.map(|r| r.old_status), Some(Unknown));

    // Checked just now, so the immediate tick skips it
    assert_eq!(h.scheduler.run_tick(Utc::now()).await.due, 0);
    assert_eq!(h.probe.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_checks_of_one_endpoint_write_once() {
    let h = harness(ScriptedProbe::new(Down), RecordingNotifier::default(), 5);
    let endpoint = site("raced", 10);
    h.registry.add(&endpoint).await.unwrap();

    let (first, second) = tokio::join!(h.scheduler.check_now(&endpoint), h.scheduler.check_now(&endpoint));
    first.unwrap();
    second.unwrap();

    assert_eq!(h.store.records_for("raced").len(), 1);
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn test_removed_endpoint_is_forgotten() {
    let h = harness(ScriptedProbe::new(Up), RecordingNotifier::default(), 5);
    let endpoint = site("gone", 10);
    h.registry.add(&endpoint).await.unwrap();

    h.scheduler.run_tick(at(0)).await;
    assert!(h.scheduler.state().lock().await.last_checked(&endpoint.key()).is_some());

    h.registry.remove(&endpoint.key()).await.unwrap();
    let report = h.scheduler.run_tick(at(10)).await;
    assert_eq!(report.due, 0);
    assert!(h.scheduler.state().lock().await.is_empty());

    h.registry.add(&endpoint).await.unwrap();
    h.scheduler.run_tick(at(12)).await;
    h.scheduler.forget(&endpoint.key()).await;
    assert!(h.scheduler.state().lock().await.last_checked(&endpoint.key()).is_none());
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = harness(ScriptedProbe::new(Up), RecordingNotifier::default(), 5);
    h.registry.add(&site("example", 60)).await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        h.scheduler.run(tokio::time::sleep(Duration::from_millis(150))),
    )
    .await
    .expect("scheduler did not stop");

    // First tick fires immediately; a 60s interval is not due again
    assert_eq!(h.probe.calls(), 1);
    assert_eq!(h.store.records_for("example").len(), 1);
}

#[tokio::test]
async fn test_tick_skips_endpoint_with_check_in_flight() {
    let h = harness(
        ScriptedProbe::new(Up).with_delay(Duration::from_millis(200)).script("slow", &[Down, Up]),
        RecordingNotifier::default(),
        5,
    );
    let endpoint = site("slow", 10);
    h.registry.add(&endpoint).await.unwrap();

    let scheduler = h.scheduler.clone();
    let registered = endpoint.clone();
    let first_check = tokio::spawn(async move { scheduler.check_now(&registered).await });

    // A tick one interval later finds the registration check still probing
    tokio::time::sleep(Duration::from_millis(50)).await;
    let later = Utc::now() + chrono::Duration::seconds(10);
    assert_eq!(h.scheduler.run_tick(later).await.due, 0);
    assert_eq!(h.probe.calls(), 1);

    let outcome = first_check.await.unwrap().unwrap();
    assert_eq!(outcome.observed, Down);

    let report = h.scheduler.run_tick(later).await;
    assert_eq!((report.due, report.transitions), (1, 1));

    let records = h.store.records_for("slow");
    let transitions: Vec<_> = records.iter().map(|r| (r.old_status, r.new_status)).collect();
    assert_eq!(transitions, vec![(Unknown, Down), (Down, Up)]);
    assert!(records.windows(2).all(|w| w[0].checked_at <= w[1].checked_at));
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn test_check_now_waits_for_running_tick() {
    let h = harness(
        ScriptedProbe::new(Up).with_delay(Duration::from_millis(200)).script("busy", &[Up, Down]),
        RecordingNotifier::default(),
        5,
    );
    let endpoint = site("busy", 10);
    h.registry.add(&endpoint).await.unwrap();

    let scheduler = h.scheduler.clone();
    let tick = tokio::spawn(async move { scheduler.run_tick(at(0)).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let outcome = h.scheduler.check_now(&endpoint).await.unwrap();
    assert_eq!(outcome.observed, Down);
    assert_eq!(tick.await.unwrap().transitions, 1);

    let records = h.store.records_for("busy");
    let transitions: Vec<_> = records.iter().map(|r| (r.old_status, r.new_status)).collect();
    assert_eq!(transitions, vec![(Unknown, Up), (Up, Down)]);
    assert!(records[0].checked_at <= records[1].checked_at);
}
