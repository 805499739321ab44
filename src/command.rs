//! Command definitions for the RespVault protocol
//!
//! A request is an array whose first element names the command
//! (case-insensitive) and whose remaining elements are its arguments.

use crate::error::{RespVaultError, Result};
use crate::protocol::Value;
use bytes::Bytes;

/// Commands supported by the RespVault protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: Bytes },
    Set { key: Bytes, value: Bytes },
    Delete { key: Bytes },
    MGet { keys: Vec<Bytes> },
    MSet { pairs: Vec<(Bytes, Bytes)> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Delete { .. } => "DELETE",
            Command::MGet { .. } => "MGET",
            Command::MSet { .. } => "MSET",
        }
    }

    /// Decode a request array into a command, validating arity
    pub fn from_frame(frame: Value) -> Result<Command> {
        let mut parts = match frame {
            Value::Array(parts) if !parts.is_empty() => parts.into_iter(),
            _ => return Err(bad_request("Bad request")),
        };

        let name = match parts.next() {
            Some(Value::Bulk(name)) => String::from_utf8_lossy(&name).to_ascii_uppercase(),
            Some(Value::Simple(name)) => name.to_ascii_uppercase(),
            _ => return Err(bad_request("Bad request: command name must be a string")),
        };
        let args: Vec<Value> = parts.collect();

        match name.as_str() {
            "GET" => {
                let [key] = exact_args::<1>(&name, args)?;
                Ok(Command::Get { key: bytes_arg(key)? })
            }
            "SET" => {
                let [key, value] = exact_args::<2>(&name, args)?;
                Ok(Command::Set {
                    key: bytes_arg(key)?,
                    value: bytes_arg(value)?,
                })
            }
            "DELETE" => {
                let [key] = exact_args::<1>(&name, args)?;
                Ok(Command::Delete { key: bytes_arg(key)? })
            }
            "MGET" => {
                let keys = args.into_iter().map(bytes_arg).collect::<Result<_>>()?;
                Ok(Command::MGet { keys })
            }
            "MSET" => {
                let pairs = args.into_iter().map(pair_arg).collect::<Result<_>>()?;
                Ok(Command::MSet { pairs })
            }
            _ => Err(RespVaultError::Command(format!(
                "Unrecognized command '{}'",
                name
            ))),
        }
    }

    /// Encode the command as a request array
    pub fn into_frame(self) -> Value {
        let name = Value::bulk(self.name());
        let args = match self {
            Command::Get { key } | Command::Delete { key } => vec![Value::Bulk(key)],
            Command::Set { key, value } => vec![Value::Bulk(key), Value::Bulk(value)],
            Command::MGet { keys } => keys.into_iter().map(Value::Bulk).collect(),
            Command::MSet { pairs } => pairs
                .into_iter()
                .map(|(key, value)| Value::Array(vec![Value::Bulk(key), Value::Bulk(value)]))
                .collect(),
        };
        Value::Array(std::iter::once(name).chain(args).collect())
    }
}

fn bad_request(message: &str) -> RespVaultError {
    RespVaultError::Command(message.to_string())
}

fn exact_args<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N]> {
    let got = args.len();
    args.try_into().map_err(|_| {
        RespVaultError::Command(format!(
            "Wrong number of arguments for '{}': expected {}, got {}",
            name, N, got
        ))
    })
}

fn bytes_arg(value: Value) -> Result<Bytes> {
    match value {
        Value::Bulk(data) => Ok(data),
        Value::Simple(text) => Ok(Bytes::from(text)),
        _ => Err(bad_request("Bad request: arguments must be strings")),
    }
}

fn pair_arg(value: Value) -> Result<(Bytes, Bytes)> {
    match value {
        Value::Array(pair) if pair.len() == 2 => {
            let [key, value] = exact_args::<2>("MSET", pair)?;
            Ok((bytes_arg(key)?, bytes_arg(value)?))
        }
        _ => Err(bad_request("Bad request: MSET expects [key, value] pairs")),
    }
}
