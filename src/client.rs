//! Client library for connecting to RespVault server
//!
//! Holds one connection and issues one request at a time. Share a client
//! between tasks behind a mutex, or open one client per task.

use crate::command::Command;
use crate::connection::Connection;
use crate::error::{RespVaultError, Result};
use crate::protocol::Value;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Client for connecting to RespVault server
pub struct Client<S = TcpStream> {
    connection: Connection<S>,
}

impl Client<TcpStream> {
    /// Connect to a RespVault server
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream
    pub fn from_stream(stream: S) -> Self {
        Self {
            connection: Connection::for_client(stream),
        }
    }

    /// Send a raw request and receive its reply
    ///
    /// An error reply becomes `RespVaultError::Command` carrying the server's
    /// message; the connection stays usable afterwards.
    pub async fn execute(&mut self, request: Value) -> Result<Value> {
        self.connection.write_value(&request).await?;
        match self.connection.read_value().await? {
            Value::Error(message) => Err(RespVaultError::Command(message)),
            reply => Ok(reply),
        }
    }

    async fn send_command(&mut self, command: Command) -> Result<Value> {
        self.execute(command.into_frame()).await
    }

    /// Get a value by key
    pub async fn get(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let command = Command::Get { key: to_bytes(key) };

        match self.send_command(command).await? {
            Value::Bulk(value) => Ok(Some(value)),
            Value::Null => Ok(None),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// Set a key-value pair; returns the server's acknowledgement
    pub async fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<String> {
        let command = Command::Set {
            key: to_bytes(key),
            value: to_bytes(value),
        };

        match self.send_command(command).await? {
            Value::Simple(ack) => Ok(ack),
            other => Err(unexpected("SET", &other)),
        }
    }

    /// Delete a key; returns the server's found/not-found status
    pub async fn delete(&mut self, key: impl AsRef<[u8]>) -> Result<String> {
        let command = Command::Delete { key: to_bytes(key) };

        match self.send_command(command).await? {
            Value::Simple(status) => Ok(status),
            other => Err(unexpected("DELETE", &other)),
        }
    }

    /// Get several keys; the result has one entry per key, in order
    pub async fn mget<I, K>(&mut self, keys: I) -> Result<Vec<Option<Bytes>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let command = Command::MGet {
            keys: keys.into_iter().map(to_bytes).collect(),
        };

        match self.send_command(command).await? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Bulk(value) => Ok(Some(value)),
                    Value::Null => Ok(None),
                    other => Err(unexpected("MGET", &other)),
                })
                .collect(),
            other => Err(unexpected("MGET", &other)),
        }
    }

    /// Set several key-value pairs in one request
    pub async fn mset<I, K, V>(&mut self, pairs: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let command = Command::MSet {
            pairs: pairs
                .into_iter()
                .map(|(key, value)| (to_bytes(key), to_bytes(value)))
                .collect(),
        };

        match self.send_command(command).await? {
            Value::Simple(ack) => Ok(ack),
            other => Err(unexpected("MSET", &other)),
        }
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.connection.shutdown().await
    }
}

fn to_bytes(data: impl AsRef<[u8]>) -> Bytes {
    Bytes::copy_from_slice(data.as_ref())
}

fn unexpected(command: &str, reply: &Value) -> RespVaultError {
    RespVaultError::Client(format!("Unexpected response for {}: {:?}", command, reply))
}
