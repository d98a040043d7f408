//! Client side of the transfer protocol.
//!
//! Connects to an ephemeral port handed out by a server and moves one
//! file per connection. Used symmetrically: upload pushes local bytes to
//! a receiver, download pulls stored bytes from a downloader.

use crate::error::{Result, SyncError};
use crate::transfer::wire;
use bytes::Bytes;
use std::path::Path;
use tokio::net::TcpStream;

pub struct TransferClient {
    host: String,
}

impl TransferClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    async fn connect(&self, port: u16) -> Result<TcpStream> {
        let addr = format!("{}:{}", self.host, port);
        TcpStream::connect(&addr)
            .await
            .map_err(|e| SyncError::Connect { addr, source: e })
    }

    /// Read `path` and stream it to `port`. Returns bytes sent.
    /// Connection errors are terminal for this attempt; the caller
    /// decides whether to resubmit.
    pub async fn upload(&self, path: &Path, port: u16) -> Result<u64> {
        let data = tokio::fs::read(path).await.map_err(|e| SyncError::Transfer {
            path: path.to_path_buf(),
            reason: format!("read failed: {}", e),
        })?;

        let mut stream = self.connect(port).await?;
        wire::send_payload(&mut stream, &data).await?;

        tracing::debug!(path = %path.display(), port, bytes = data.len(), "upload complete");
        Ok(data.len() as u64)
    }

    /// Pull one payload from `port` into memory.
    pub async fn download(&self, port: u16) -> Result<Bytes> {
        let mut stream = self.connect(port).await?;
        let data = wire::recv_payload(&mut stream).await?;
        tracing::debug!(port, bytes = data.len(), "download complete");
        Ok(data)
    }
}
