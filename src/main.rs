//! RespVault Server Binary
//!
//! Main entry point for the RespVault TCP server

use clap::Parser;
use respvault::{Result, RespVaultServer, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{fmt, EnvFilter};

/// RespVault Server
#[derive(Parser, Debug)]
#[command(name = "respvault-server")]
#[command(about = "In-memory key-value store with a RESP-style protocol")]
#[command(version)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum concurrent connections
    #[arg(short, long)]
    max_connections: Option<usize>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max_connections) = self.max_connections {
            config.max_connections = max_connections;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,respvault=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let config = Args::parse().into_config()?;
    tracing::info!("RespVault server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(config = %config.to_json()?, "effective configuration");

    let server = Arc::new(RespVaultServer::new(config)?);

    // Setup graceful shutdown on SIGINT (Ctrl+C)
    let server_clone = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }

        tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        if let Err(e) = server_clone.shutdown() {
            tracing::error!("Failed to initiate shutdown: {}", e);
        }
    });

    server.run().await
}
