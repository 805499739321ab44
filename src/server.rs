//! RespVault TCP Server
//!
//! Accepts connections, bounded by `max_connections`, and drives each one's
//! request/reply loop on its own tokio task. All connections share a single
//! store through the dispatcher.

use crate::{
    connection::Connection,
    dispatcher::Dispatcher,
    error::{RespVaultError, Result},
    protocol::Value,
    store::{MemoryStore, Store},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::{broadcast, Semaphore},
};
use tracing::{debug, error, info, warn};

/// RespVault server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4567,
            max_connections: 64,
        }
    }
}

impl ServerConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as JSON in the format `from_file` reads
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(RespVaultError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// RespVault TCP server
pub struct RespVaultServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher<MemoryStore>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RespVaultServer {
    /// Create a new server instance with an empty store
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(MemoryStore::new());
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            dispatcher: Arc::new(Dispatcher::new(store)),
            shutdown_tx,
        })
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        self.dispatcher.store()
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            addr = %listener.local_addr()?,
            max_connections = self.config.max_connections,
            "RespVault server listening"
        );

        let limit = Arc::new(Semaphore::new(self.config.max_connections));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            // Wait for a free slot before accepting; excess clients queue in the backlog.
            let permit = tokio::select! {
                permit = Arc::clone(&limit).acquire_owned() => permit.map_err(|_| {
                    RespVaultError::Server("connection limiter closed".to_string())
                })?,
                _ = shutdown_rx.recv() => break,
            };

            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            info!(%addr, "client connected");
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(%addr, "failed to set TCP_NODELAY: {}", e);
                            }
                            let dispatcher = Arc::clone(&self.dispatcher);
                            let shutdown_rx = self.shutdown_tx.subscribe();

                            tokio::spawn(async move {
                                let connection = Connection::for_server(stream);
                                if let Err(e) = handle_client(connection, dispatcher, shutdown_rx).await {
                                    debug!(%addr, "connection ended with error: {}", e);
                                }
                                info!(%addr, "client disconnected");
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            error!("failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        info!("server stopped");
        Ok(())
    }

    /// Trigger graceful shutdown of the acceptor and every open connection
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(()).map_err(|_| {
            RespVaultError::Server("Failed to send shutdown signal".to_string())
        })?;
        Ok(())
    }
}

/// Drive one connection's request/reply loop
///
/// Exactly one reply is written per request, in order. A command error
/// becomes an error reply and the loop continues; a protocol error is
/// reported once and then closes the connection.
pub async fn handle_client<S, T>(
    mut connection: Connection<S>,
    dispatcher: Arc<Dispatcher<T>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Store,
{
    loop {
        let request = tokio::select! {
            result = connection.read_value() => match result {
                Ok(request) => request,
                Err(RespVaultError::Disconnected) => break,
                Err(RespVaultError::Protocol(detail)) => {
                    warn!("closing connection after protocol error: {}", detail);
                    let reply = Value::Error(format!("Protocol error: {}", detail));
                    let _ = connection.write_value(&reply).await;
                    break;
                }
                Err(e) => return Err(e),
            },
            _ = shutdown_rx.recv() => {
                debug!("shutdown signal received, closing client connection");
                break;
            }
        };

        let reply = match dispatcher.route(request) {
            Ok(reply) => reply,
            Err(RespVaultError::Command(message)) => Value::Error(message),
            Err(e) => Value::Error(e.to_string()),
        };

        connection.write_value(&reply).await?;
    }

    // The peer may already be gone; nothing left to report to it.
    let _ = connection.shutdown().await;
    Ok(())
}
