//! Subcommands that talk to a host

pub mod ask;
pub mod collect;
pub mod config;
pub mod kill;
pub mod listen;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::Value;
use tether_core::{EndReason, SocketClient};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigLoader, TetherConfig};

/// Connection flags shared by every remote command
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Host address (overrides config)
    #[arg(long, global = true, env = "TETHER_URL")]
    pub url: Option<String>,

    /// Credential sent during the handshake (overrides config)
    #[arg(long, global = true, env = "TETHER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Keep listeners across disconnects instead of flushing them
    #[arg(long, global = true)]
    pub retain_listeners: bool,
}

impl ConnectionArgs {
    /// Layer command line flags over the loaded configuration
    pub fn apply(&self, mut config: TetherConfig) -> TetherConfig {
        if let Some(url) = &self.url {
            config.host.url = url.clone();
        }
        if let Some(api_key) = &self.api_key {
            config.host.api_key = Some(api_key.clone());
        }
        if self.retain_listeners {
            config.listeners.retain_on_disconnect = true;
        }
        config
    }
}

/// Commands that need a live connection
#[derive(Subcommand, Debug)]
pub enum RemoteCommand {
    /// Call a remote method and print its result
    Ask(ask::AskArgs),
    /// Print events pushed by the host
    Listen(listen::ListenArgs),
    /// Collect messages for a chat within a window
    Collect(collect::CollectArgs),
    /// End the host's current session
    KillSession,
}

/// Failures specific to the CLI
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Collector ended with {reason} after {count} message(s)")]
    CollectorEnded { reason: EndReason, count: usize },
}

/// Connect using config files plus command line overrides
pub async fn connect(conn: &ConnectionArgs) -> Result<SocketClient> {
    let config = conn.apply(ConfigLoader::load()?);
    let client_config = config.client_config()?;
    debug!(address = %client_config.address, "Connecting");

    let client = SocketClient::connect(client_config).await?;
    info!(address = %client.config().address, "Connected");
    Ok(client)
}

/// Run a remote command until it finishes or Ctrl-C is pressed
pub async fn run(command: RemoteCommand, conn: ConnectionArgs) -> Result<()> {
    let client = connect(&conn).await?;

    let result = tokio::select! {
        result = dispatch(&client, command) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };

    client.close().await;
    result
}

async fn dispatch(client: &SocketClient, command: RemoteCommand) -> Result<()> {
    match command {
        RemoteCommand::Ask(args) => ask::run(client, args).await,
        RemoteCommand::Listen(args) => listen::run(client, args).await,
        RemoteCommand::Collect(args) => collect::run(client, args).await,
        RemoteCommand::KillSession => kill::run(client).await,
    }
}

/// Parse a command line value as JSON, falling back to a plain string
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
