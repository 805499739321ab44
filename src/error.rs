//! Error types for RespVault

use nom::error::{VerboseError, VerboseErrorKind};
use thiserror::Error;
use std::io;

/// Result type alias for RespVault operations
pub type Result<T> = std::result::Result<T, RespVaultError>;

/// Custom error types for RespVault
#[derive(Error, Debug)]
pub enum RespVaultError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer closed the stream between frames.
    #[error("Connection closed by peer")]
    Disconnected,

    /// A well-formed request the command layer rejected, or an error reply
    /// received by the client.
    #[error("{0}")]
    Command(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<nom::Err<VerboseError<&[u8]>>> for RespVaultError {
    fn from(err: nom::Err<VerboseError<&[u8]>>) -> Self {
        let detail = match &err {
            nom::Err::Incomplete(_) => Some("truncated frame"),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                e.errors.iter().find_map(|(_, kind)| match kind {
                    VerboseErrorKind::Context(ctx) => Some(*ctx),
                    _ => None,
                })
            }
        };
        RespVaultError::Protocol(detail.unwrap_or("malformed frame").to_string())
    }
}
