use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::MonitoredEndpoint;
use crate::monitoring::{ProbeSettings, SchedulerSettings};
use crate::notify::SmtpSettings;
use crate::validation::{DEFAULT_ALLOWED_INTERVALS, EndpointValidator};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("Failed to write config file: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("No config path available: set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub prober: ProberConfig,
    pub notifier: NotifierConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
    /// Endpoints registered at startup if not already present
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_seconds: u64,
    pub max_concurrent_checks: usize,
    pub allowed_intervals: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProberConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Timeout for webhook requests
    pub timeout_seconds: u64,
    /// Alerts go to the log when neither this nor `smtp` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Email delivery, preferred over the webhook when both are set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub block_private_targets: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_owner")]
    pub owner: String,
    pub name: String,
    pub url: String,
    pub interval_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_content: Option<String>,
}

fn default_owner() -> String {
    "default".into()
}

impl From<&EndpointConfig> for MonitoredEndpoint {
    fn from(cfg: &EndpointConfig) -> Self {
        MonitoredEndpoint {
            owner: cfg.owner.clone(),
            name: cfg.name.clone(),
            url: cfg.url.clone(),
            interval_seconds: cfg.interval_seconds,
            expected_content: cfg.expected_content.clone(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "sitewatch.db".into(), max_connections: 8 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 5,
            max_concurrent_checks: 5,
            allowed_intervals: DEFAULT_ALLOWED_INTERVALS.to_vec(),
        }
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        let defaults = ProbeSettings::default();
        Self {
            timeout_seconds: defaults.timeout_seconds,
            user_agent: defaults.user_agent,
            accept_invalid_certs: defaults.accept_invalid_certs,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { timeout_seconds: 10, webhook_url: None, smtp: None }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { block_private_targets: false }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            prober: ProberConfig::default(),
            notifier: NotifierConfig::default(),
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
            endpoints: Vec::new(),
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/sitewatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("sitewatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let intervals = self
            .scheduler
            .allowed_intervals
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        writeln!(f, "Current Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Tick (s)", &self.scheduler.tick_seconds)?;
        write_1(f, "Max Concurrent Checks", &self.scheduler.max_concurrent_checks)?;
        write_1(f, "Allowed Intervals (s)", &intervals)?;
        write_title_1(f, "Prober")?;
        write_1(f, "Timeout (s)", &self.prober.timeout_seconds)?;
        write_1(f, "User-Agent", &self.prober.user_agent)?;
        write_1(f, "Accept Invalid Certs", &self.prober.accept_invalid_certs)?;
        write_title_1(f, "Notifier")?;
        write_1(f, "Webhook", &self.notifier.webhook_url.as_deref().unwrap_or("(none)"))?;
        match &self.notifier.smtp {
            Some(smtp) => {
                write_1(f, "SMTP Server", &format!("{}:{}", smtp.server, smtp.port))?;
                write_1(f, "Mail Recipients", &smtp.to.join(", "))?;
            }
            None if self.notifier.webhook_url.is_none() => write_1(f, "Delivery", &"(log only)")?,
            None => {}
        }
        write_title_1(f, "Registry")?;
        write_1(f, "Block Private Targets", &self.registry.block_private_targets)?;
        write_1(f, "Seeded Endpoints", &self.endpoints.len())?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/sitewatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Self::from_toml(&raw_string)?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, Error> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        const MAX_TIMEOUT: u64 = 300; // 5 minutes

        let invalid = |field, reason: &str| Err(Error::Invalid { field, reason: reason.into() });

        if self.scheduler.tick_seconds == 0 {
            return invalid("scheduler.tick_seconds", "must be at least 1");
        }
        if self.scheduler.max_concurrent_checks == 0 {
            return invalid("scheduler.max_concurrent_checks", "must be at least 1");
        }
        if self.scheduler.allowed_intervals.is_empty() {
            return invalid("scheduler.allowed_intervals", "must not be empty");
        }
        if self.scheduler.allowed_intervals.contains(&0) {
            return invalid("scheduler.allowed_intervals", "intervals must be positive");
        }
        if !(1..=MAX_TIMEOUT).contains(&self.prober.timeout_seconds) {
            return invalid("prober.timeout_seconds", "must be between 1 and 300");
        }
        if self.database.max_connections == 0 {
            return invalid("database.max_connections", "must be at least 1");
        }
        if let Some(url) = &self.notifier.webhook_url {
            if url::Url::parse(url).is_err() {
                return invalid("notifier.webhook_url", "must be a valid URL");
            }
        }
        if let Some(smtp) = &self.notifier.smtp {
            if smtp.server.trim().is_empty() {
                return invalid("notifier.smtp.server", "must not be empty");
            }
            if smtp.from.parse::<lettre::message::Mailbox>().is_err() {
                return invalid("notifier.smtp.from", "must be a valid address");
            }
            if smtp.to.is_empty() {
                return invalid("notifier.smtp.to", "must list at least one recipient");
            }
            if smtp.to.iter().any(|to| to.parse::<lettre::message::Mailbox>().is_err()) {
                return invalid("notifier.smtp.to", "must contain valid addresses");
            }
        }

        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick: Duration::from_secs(self.scheduler.tick_seconds),
            max_concurrent_checks: self.scheduler.max_concurrent_checks,
            allowed_intervals: self.scheduler.allowed_intervals.clone(),
        }
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            timeout_seconds: self.prober.timeout_seconds,
            user_agent: self.prober.user_agent.clone(),
            accept_invalid_certs: self.prober.accept_invalid_certs,
        }
    }

    pub fn endpoint_validator(&self) -> EndpointValidator {
        EndpointValidator::new(
            self.scheduler.allowed_intervals.clone(),
            self.registry.block_private_targets,
        )
    }
}
