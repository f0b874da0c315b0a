/// Monitoring engine module
///
/// - `checker`: one HTTP probe, classified UP/DOWN
/// - `executor`: probe, reconcile against the status log, alert
/// - `scheduler`: due selection and bounded concurrent dispatch per tick
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod tests;

pub use checker::{HttpChecker, Probe, ProbeSettings};
pub use executor::{AlertOutcome, CheckOutcome, MonitoringExecutor};
pub use scheduler::{MonitoringScheduler, SchedulerSettings, SchedulerState, TickReport};
pub use types::{CheckResult, MonitorStatus, ProbeFailure};
