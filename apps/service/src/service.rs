use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::{Config, EndpointConfig};
use crate::database::models::{EndpointKey, MonitoredEndpoint};
use crate::database::{DatabaseImpl, Registry, initialize_database};
use crate::error::{RegistryError, StoreError};
use crate::monitoring::{CheckOutcome, HttpChecker, MonitoringExecutor, MonitoringScheduler};
use crate::notify::{EmailNotifier, LogNotifier, Notifier, WebhookNotifier};
use crate::pool;

/// Wires storage, prober, notifier and scheduler together
pub struct Service {
    database: Arc<DatabaseImpl>,
    scheduler: MonitoringScheduler,
}

impl Service {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = pool::open_local(&config.database.path, config.database.max_connections).await?;

        info!("Initializing database schema...");
        let conn = pool.get().await?;
        initialize_database(&conn).await?;
        drop(conn);

        let database = Arc::new(DatabaseImpl::new_from_pool(pool, config.endpoint_validator()));

        let prober = Arc::new(HttpChecker::new(&config.probe_settings())?);
        let notifier: Arc<dyn Notifier> = match (&config.notifier.smtp, &config.notifier.webhook_url) {
            (Some(smtp), _) => Arc::new(EmailNotifier::new(smtp)?),
            (None, Some(url)) => {
                Arc::new(WebhookNotifier::new(url.clone(), config.notifier.timeout_seconds)?)
            }
            (None, None) => Arc::new(LogNotifier),
        };
        info!("DOWN alerts via {} notifier", notifier.name());

        let executor = Arc::new(MonitoringExecutor::new(prober, database.clone(), notifier));
        let scheduler =
            MonitoringScheduler::new(database.clone(), executor, config.scheduler_settings());

        Ok(Self { database, scheduler })
    }

    pub fn database(&self) -> &Arc<DatabaseImpl> {
        &self.database
    }

    pub fn scheduler(&self) -> &MonitoringScheduler {
        &self.scheduler
    }

    /// Register an endpoint and check it right away.
    ///
    /// A failure to record the first check is logged; the next tick retries it.
    pub async fn register(
        &self,
        endpoint: &MonitoredEndpoint,
    ) -> Result<Option<CheckOutcome>, RegistryError> {
        self.database.add(endpoint).await?;
        info!(endpoint = %endpoint.key(), url = %endpoint.url, "Registered endpoint");

        match self.scheduler.check_now(endpoint).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                warn!(endpoint = %endpoint.key(), "Initial check not recorded: {}", e);
                Ok(None)
            }
        }
    }

    /// Delete an endpoint with its history and stop scheduling it
    pub async fn unregister(&self, key: &EndpointKey) -> Result<bool, StoreError> {
        let removed = self.database.remove(key).await?;
        self.scheduler.forget(key).await;
        if removed {
            info!(endpoint = %key, "Removed endpoint");
        }
        Ok(removed)
    }

    /// Register endpoints from the config file, skipping ones already present.
    /// Returns how many were added.
    pub async fn seed_endpoints(&self, endpoints: &[EndpointConfig]) -> usize {
        let mut added = 0;

        for cfg in endpoints {
            let endpoint = MonitoredEndpoint::from(cfg);
            match self.register(&endpoint).await {
                Ok(_) => added += 1,
                Err(RegistryError::Store(StoreError::Conflict(_))) => {
                    debug!(endpoint = %endpoint.key(), "Configured endpoint already registered");
                }
                Err(e) => warn!(endpoint = %endpoint.key(), "Skipping configured endpoint: {}", e),
            }
        }

        added
    }

    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        self.scheduler.run(shutdown).await;
    }
}
