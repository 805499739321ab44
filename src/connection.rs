//! Framed connection over a duplex byte stream
//!
//! Shared by the server and the client. Incoming bytes accumulate in a
//! buffer until `protocol::check_frame` finds a complete value, which is then
//! split off and decoded without copying its payloads. Outgoing values are
//! checked against the peer's limits, encoded and flushed one frame at a time.

use crate::error::{RespVaultError, Result};
use crate::protocol::{check_frame, decode_frame, FrameLimits, Value};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

/// A buffered, value-oriented view of a byte stream
pub struct Connection<S> {
    stream: BufWriter<S>,
    buffer: BytesMut,
    read_limits: FrameLimits,
    write_limits: FrameLimits,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// `read_limits` bound what this side accepts; `write_limits` are the
    /// limits the peer decodes with.
    pub fn new(stream: S, read_limits: FrameLimits, write_limits: FrameLimits) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(4096),
            read_limits,
            write_limits,
        }
    }

    /// Server side: reads requests, writes replies
    pub fn for_server(stream: S) -> Self {
        Self::new(stream, FrameLimits::REQUEST, FrameLimits::REPLY)
    }

    /// Client side: reads replies, writes requests
    pub fn for_client(stream: S) -> Self {
        Self::new(stream, FrameLimits::REPLY, FrameLimits::REQUEST)
    }

    /// Read the next complete value from the stream
    ///
    /// Fails with `Disconnected` if the peer closes the stream between
    /// frames, and with a protocol error if it closes mid-frame. Cancelling
    /// the returned future loses no data: partial frames stay buffered.
    pub async fn read_value(&mut self) -> Result<Value> {
        loop {
            if let Some(len) = check_frame(&self.buffer, &self.read_limits)? {
                let frame = self.buffer.split_to(len).freeze();
                return decode_frame(&frame, &self.read_limits);
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return if self.buffer.is_empty() {
                    Err(RespVaultError::Disconnected)
                } else {
                    Err(RespVaultError::Protocol(
                        "connection closed mid-frame".to_string(),
                    ))
                };
            }
        }
    }

    /// Encode `value` and flush it to the peer
    ///
    /// A value the peer would reject is refused with a protocol error and
    /// nothing is sent, so the connection stays usable.
    pub async fn write_value(&mut self, value: &Value) -> Result<()> {
        value.check_limits(&self.write_limits)?;
        self.stream.write_all(&value.to_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Flush pending output and close the write half
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_write_then_read_value() {
        let (left, right) = duplex(64);
        let mut sender = Connection::for_client(left);
        let mut receiver = Connection::for_server(right);

        let request = Value::Array(vec![Value::bulk("GET"), Value::bulk("key")]);
        sender.write_value(&request).await.unwrap();

        assert_eq!(receiver.read_value().await.unwrap(), request);
    }

    #[tokio::test]
    async fn test_value_split_across_reads() {
        let (mut raw, peer) = duplex(8);
        let mut connection = Connection::for_server(peer);

        let writer = tokio::spawn(async move {
            for chunk in [&b"*2\r\n$3\r"[..], b"\nGET\r\n", b"$0\r\n", b"\r\n"] {
                raw.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            raw
        });

        let value = connection.read_value().await.unwrap();
        assert_eq!(value, Value::Array(vec![Value::bulk("GET"), Value::bulk("")]));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_back_to_back_values() {
        let (mut raw, peer) = duplex(64);
        let mut connection = Connection::for_server(peer);

        raw.write_all(b"+OK\r\n:7\r\n$-1\r\n").await.unwrap();

        assert_eq!(connection.read_value().await.unwrap(), Value::Simple("OK".into()));
        assert_eq!(connection.read_value().await.unwrap(), Value::Integer(7));
        assert_eq!(connection.read_value().await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_clean_close_is_disconnect() {
        let (raw, peer) = duplex(64);
        let mut connection = Connection::for_server(peer);
        drop(raw);

        assert!(matches!(
            connection.read_value().await,
            Err(RespVaultError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_close_mid_frame_is_protocol_error() {
        let (mut raw, peer) = duplex(64);
        let mut connection = Connection::for_server(peer);
        raw.write_all(b"$5\r\nab").await.unwrap();
        drop(raw);

        assert!(matches!(
            connection.read_value().await,
            Err(RespVaultError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_is_protocol_error() {
        let (mut raw, peer) = duplex(64);
        let mut connection = Connection::for_server(peer);
        raw.write_all(b"hello\r\n").await.unwrap();

        assert!(matches!(
            connection.read_value().await,
            Err(RespVaultError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_long_status_line_only_accepted_as_reply() {
        let line = format!("+OK set 'k' to '{}'\r\n", "x".repeat(2 * FrameLimits::REQUEST.max_line_len));

        let (mut raw, peer) = duplex(1024);
        let mut client = Connection::for_client(peer);
        let sent = line.clone();
        let writer = tokio::spawn(async move {
            raw.write_all(sent.as_bytes()).await.unwrap();
            raw
        });
        match client.read_value().await.unwrap() {
            Value::Simple(text) => assert_eq!(text.len(), line.len() - 3),
            other => panic!("expected simple string, got {:?}", other),
        }
        drop(writer.await.unwrap());

        let (mut raw, peer) = duplex(1024);
        let mut server = Connection::for_server(peer);
        let writer = tokio::spawn(async move {
            let _ = raw.write_all(line.as_bytes()).await;
        });
        assert!(matches!(
            server.read_value().await,
            Err(RespVaultError::Protocol(ref detail)) if detail == "line too long"
        ));
        drop(server);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_refuses_value_peer_would_reject() {
        let (left, right) = duplex(64);
        let mut sender = Connection::for_client(left);
        let mut receiver = Connection::for_server(right);

        let mut deep = Value::bulk("x");
        for _ in 0..=FrameLimits::REQUEST.max_depth {
            deep = Value::Array(vec![deep]);
        }
        assert!(matches!(
            sender.write_value(&deep).await,
            Err(RespVaultError::Protocol(_))
        ));

        // Nothing was sent; the next value arrives intact
        let request = Value::Array(vec![Value::bulk("GET"), Value::bulk("key")]);
        sender.write_value(&request).await.unwrap();
        assert_eq!(receiver.read_value().await.unwrap(), request);
    }
}
