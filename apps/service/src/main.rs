use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use sitewatch::{Config, Service};

/// Uptime monitoring service
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file (defaults to $XDG_CONFIG_HOME/sitewatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_config(args.config.as_ref())?;

    if args.print_config {
        print!("{config}");
        return Ok(());
    }

    logger::init_from_settings(&config.logging.level, &config.logging.format);

    let service = Service::from_config(&config).await?;
    let seeded = service.seed_endpoints(&config.endpoints).await;
    if seeded > 0 {
        info!("Registered {} endpoints from config", seeded);
    }

    service.run(shutdown_signal()).await;
    info!("sitewatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        futures::future::pending::<()>().await;
    }
}
