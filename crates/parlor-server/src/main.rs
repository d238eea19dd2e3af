use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parlor_core::{HubBuilder, MemorySessionStore};
use tracing::info;

mod commands;
mod config;
mod server;
mod telemetry;

use config::{Cli, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(&cli)?;

    telemetry::init(config.json_logs)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    info!("Parlor Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("License: AGPL-3.0");

    let sessions = Arc::new(MemorySessionStore::new());
    let mut builder = HubBuilder::new(sessions.clone()).config(config.hub.clone());
    commands::register(&mut builder).context("Failed to register chat commands")?;
    let hub = builder.build();

    let state = Arc::new(server::AppState::new(hub, sessions));
    server::start(config.bind, state).await?;

    Ok(())
}
