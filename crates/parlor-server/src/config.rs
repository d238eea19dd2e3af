//! Server configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! command-line flags.
//!
//! ```toml
//! bind = "127.0.0.1:3000"
//! json_logs = false
//!
//! [hub]
//! single_session = true
//! restore_rooms = true
//! outbound_buffer = 256
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use parlor_core::HubConfig;
use serde::Deserialize;

/// Parlor Server - WebSocket chat rooms with presence
#[derive(Debug, Parser)]
#[command(name = "parlor-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on (default: 0.0.0.0:3000)
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// Close an identity's older connections when it connects again
    #[arg(long)]
    pub single_session: Option<bool>,

    /// Do not rejoin persisted rooms on connect
    #[arg(long)]
    pub no_restore_rooms: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Capacity of each connection's outbound queue
    #[arg(long)]
    pub outbound_buffer: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub json_logs: bool,
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            json_logs: false,
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Resolve the effective configuration for a command line.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                Self::from_toml(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            }
            None => Self::default(),
        };
        config.apply_cli(cli);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(bind) = cli.bind {
            self.bind = bind;
        }
        if let Some(single_session) = cli.single_session {
            self.hub.single_session = single_session;
        }
        if cli.no_restore_rooms {
            self.hub.restore_rooms = false;
        }
        if cli.json_logs {
            self.json_logs = true;
        }
        if let Some(outbound_buffer) = cli.outbound_buffer {
            self.hub.outbound_buffer = outbound_buffer;
        }
    }
}
