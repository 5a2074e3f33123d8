//! Simulated jammer service.
//!
//! Accepts ON/OFF control requests over TCP and emits periodic transmission
//! frames on a UDP multicast channel while the jammer is on.

mod channel;
mod config;
mod error;
mod frame;
mod plugin;
mod timer;
mod transport;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::config::ServiceConfig;
use crate::plugin::JammerService;

#[derive(Parser, Debug)]
#[command(name = "jammer-service", about = "Simulated jammer ON/OFF controller")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, value_name = "PATH")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset; overrides the config file.
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ServiceConfig::load(&args.config)?;

    let default_filter = args
        .log_level
        .as_deref()
        .or(config.log.level.as_deref())
        .unwrap_or("info");
    init_tracing(default_filter);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(serve(config))
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let mut service = JammerService::new(config);
    service.initialize().await?;
    service.start()?;

    let outcome = service.run(shutdown_signal()).await;

    service.stop()?;
    service.destroy()?;
    outcome.context("jammer service stopped with an error")
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c, running until the transport stops");
        std::future::pending::<()>().await;
    }
}
