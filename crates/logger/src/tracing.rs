use std::env::var;
use std::str::FromStr;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Initialize tracing from textual settings, as read from a config file.
///
/// `RUST_LOG` still wins over `level`, and `RUST_LOG_FORMAT` over `format`.
pub fn init_from_settings(level: &str, format: &str) {
    let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::INFO);
    let format = format.parse().unwrap_or_default();
    init_with(level, format);
}

fn init_with(level: LevelFilter, format: LogFormat) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let (format, rejected) = resolve_format(var("RUST_LOG_FORMAT").ok().as_deref(), format);

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(log_layer).try_init();

    // Reported once a subscriber exists to receive it
    if let Some(error) = rejected {
        warn!("Ignoring RUST_LOG_FORMAT: {error}");
    }
}

/// Apply a `RUST_LOG_FORMAT` override to the configured format.
/// An unparsable override keeps `configured` and returns the parse error.
fn resolve_format(raw: Option<&str>, configured: LogFormat) -> (LogFormat, Option<String>) {
    match raw.map(str::parse::<LogFormat>) {
        Some(Ok(format)) => (format, None),
        Some(Err(error)) => (configured, Some(error)),
        None => (configured, None),
    }
}
