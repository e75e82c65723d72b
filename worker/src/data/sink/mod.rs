//! Log-analytics sink forwarding
//!
//! Records are forwarded one per line over a plain TCP connection, the
//! sink's line protocol. Forwarding is best-effort: a failed write drops
//! the connection and the next record triggers a reconnect attempt.

pub mod error;

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::core::config::SinkConfig;
use crate::core::constants::SINK_CONNECT_TIMEOUT_SECS;

pub use error::SinkError;

/// TCP line-protocol client for the configured sink.
#[derive(Debug)]
pub struct RecordSink {
    addr: String,
    conn: Option<TcpStream>,
}

impl RecordSink {
    /// Connect eagerly so an unreachable sink is reported before any
    /// records are consumed.
    pub async fn connect(config: &SinkConfig) -> Result<Self, SinkError> {
        let addr = format!("{}:{}", config.host, config.port);
        let conn = Self::dial(&addr).await?;
        tracing::debug!(addr = %addr, "Sink connected");
        Ok(Self {
            addr,
            conn: Some(conn),
        })
    }

    async fn dial(addr: &str) -> Result<TcpStream, SinkError> {
        let timeout = Duration::from_secs(SINK_CONNECT_TIMEOUT_SECS);
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(SinkError::Unreachable {
                addr: addr.to_string(),
                source: e,
            }),
            Err(_) => Err(SinkError::Unreachable {
                addr: addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            }),
        }
    }

    /// Forward one record line.
    ///
    /// A failed write drops the connection so the next call attempts a
    /// reconnect before giving up on the record.
    pub async fn forward(&mut self, record: &str) -> Result<(), SinkError> {
        if self.conn.is_none() {
            let stream = Self::dial(&self.addr).await?;
            tracing::debug!(addr = %self.addr, "Sink reconnected");
            self.conn = Some(stream);
        }

        let Some(stream) = self.conn.as_mut() else {
            return Err(SinkError::Write(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "sink connection lost",
            )));
        };

        if let Err(e) = write_record(stream, record).await {
            self.conn = None;
            return Err(SinkError::Write(e));
        }
        Ok(())
    }
}

async fn write_record(stream: &mut TcpStream, record: &str) -> std::io::Result<()> {
    stream.write_all(record.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn sink_config(port: u16) -> SinkConfig {
        SinkConfig {
            host: "127.0.0.1".to_string(),
            port,
            failure_threshold: None,
        }
    }

    /// Accept one connection and collect lines until the peer closes.
    async fn collect_lines(listener: TcpListener) -> Vec<String> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let mut received = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            received.push(line);
        }
        received
    }

    #[tokio::test]
    async fn test_forward_records_line_protocol() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(collect_lines(listener));

        let mut sink = RecordSink::connect(&sink_config(port)).await.unwrap();
        sink.forward(r#"{"ts":1}"#).await.unwrap();
        sink.forward(r#"{"ts":2}"#).await.unwrap();
        drop(sink);

        let received = server.await.unwrap();
        assert_eq!(received, vec![r#"{"ts":1}"#, r#"{"ts":2}"#]);
    }

    #[tokio::test]
    async fn test_connect_unreachable_sink() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = RecordSink::connect(&sink_config(port)).await.unwrap_err();
        assert!(matches!(err, SinkError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_forward_reconnects_after_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // First connection is accepted and dropped immediately
        let first = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
            listener
        });

        let mut sink = RecordSink::connect(&sink_config(port)).await.unwrap();
        let listener = first.await.unwrap();
        let server = tokio::spawn(collect_lines(listener));

        // Writes eventually fail once the peer reset propagates; the record
        // that fails is reported and the connection is dropped for reconnect.
        let mut failed = false;
        for _ in 0..50 {
            if sink.forward(r#"{"probe":true}"#).await.is_err() {
                failed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(failed, "write to a closed peer should eventually fail");

        // Next record reconnects and goes through
        sink.forward(r#"{"after":"reconnect"}"#).await.unwrap();
        drop(sink);

        let received = server.await.unwrap();
        assert!(received.contains(&r#"{"after":"reconnect"}"#.to_string()));
    }
}
