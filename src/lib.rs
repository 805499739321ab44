//! RespVault - An in-memory key-value store speaking a RESP-style protocol
//!
//! This library provides:
//! - A binary-safe wire codec shared by client and server
//! - A TCP server with one task per connection and a connection limit
//! - A thread-safe in-memory store shared across connections
//! - An async client with typed GET/SET/DELETE/MGET/MSET calls

pub mod client;
pub mod command;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod server;
pub mod store;

pub use client::Client;
pub use command::Command;
pub use connection::Connection;
pub use dispatcher::Dispatcher;
pub use error::{RespVaultError, Result};
pub use protocol::{FrameLimits, Value};
pub use server::{RespVaultServer, ServerConfig};
pub use store::{MemoryStore, Store};
