//! Server-side command router
//!
//! Turns a decoded request into a store operation and builds the reply.

use crate::command::Command;
use crate::error::{RespVaultError, Result};
use crate::protocol::Value;
use crate::store::Store;
use std::sync::Arc;

/// Routes requests to a shared store
pub struct Dispatcher<S> {
    store: Arc<S>,
}

impl<S: Store> Dispatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Route a request array to its command
    ///
    /// Fails with `RespVaultError::Command` for requests the command layer
    /// rejects; the caller turns that into an error reply.
    pub fn route(&self, request: Value) -> Result<Value> {
        let command = Command::from_frame(request)?;
        tracing::trace!(command = command.name(), "dispatching");
        self.execute(command)
    }

    /// Execute a parsed command against the store
    pub fn execute(&self, command: Command) -> Result<Value> {
        let name = command.name();
        let failed = |e: RespVaultError| RespVaultError::Command(format!("{} failed: {}", name, e));

        match command {
            Command::Get { key } => {
                let value = self.store.get(&key).map_err(failed)?;
                Ok(Value::optional_bulk(value))
            }
            Command::Set { key, value } => {
                let reply = format!("OK set '{}' to '{}'", printable(&key), printable(&value));
                self.store.set(key, value).map_err(failed)?;
                Ok(Value::Simple(reply))
            }
            Command::Delete { key } => {
                let reply = if self.store.delete(&key).map_err(failed)? {
                    format!("Deleted '{}'", printable(&key))
                } else {
                    format!("Key '{}' not found", printable(&key))
                };
                Ok(Value::Simple(reply))
            }
            Command::MGet { keys } => {
                let values = self.store.mget(&keys).map_err(failed)?;
                Ok(Value::Array(values.into_iter().map(Value::optional_bulk).collect()))
            }
            Command::MSet { pairs } => {
                let count = pairs.len();
                self.store.mset(pairs).map_err(failed)?;
                Ok(Value::Simple(format!("OK set {} keys", count)))
            }
        }
    }
}

/// Render stored bytes for a status line: lossy UTF-8, control characters escaped.
fn printable(data: &[u8]) -> String {
    String::from_utf8_lossy(data).escape_default().to_string()
}
