//! Ephemeral transfer endpoints.
//!
//! Each service owns one listener for the lifetime of one transfer:
//! Listening -> Accepting -> Transferring -> Closed. Ports are
//! single-use; the listener closes after the first connection completes
//! (successfully or not) or the accept itself fails. Closing always
//! removes the registry entry.

use crate::error::Result;
use crate::server::allocator::TransferRegistry;
use crate::store::BlobStore;
use crate::transfer::wire;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Receives one upload and pushes it into the blob store.
pub struct ReceiverService;

impl ReceiverService {
    /// Take ownership of a bound listener and run the transfer on its
    /// own task. Returns the task handle for callers that need to wait
    /// (tests do; the change handler does not).
    pub fn spawn(
        listener: TcpListener,
        port: u16,
        key: String,
        blob: Arc<dyn BlobStore>,
        registry: TransferRegistry,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(port, key = %key, "receiver started");

            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(port, %peer, "connection accepted");
                    match Self::handle_upload(stream, &key, blob.as_ref()).await {
                        Ok(bytes) => {
                            tracing::info!(port, key = %key, bytes, "transfer completed")
                        }
                        Err(e) => tracing::error!(port, key = %key, err = %e, "upload failed"),
                    }
                }
                Err(e) => tracing::error!(port, err = %e, "accept failed"),
            }

            registry.remove(port);
        })
    }

    async fn handle_upload(
        mut stream: TcpStream,
        key: &str,
        blob: &dyn BlobStore,
    ) -> Result<u64> {
        let data = wire::recv_payload(&mut stream).await?;
        let size = data.len() as u64;
        blob.put(key, data).await?;
        Ok(size)
    }
}

/// Serves one stored blob to the first connection.
pub struct DownloaderService;

impl DownloaderService {
    pub fn spawn(
        listener: TcpListener,
        port: u16,
        key: String,
        blob: Arc<dyn BlobStore>,
        registry: TransferRegistry,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(port, key = %key, "downloader started");

            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(port, %peer, "connection accepted");
                    match Self::handle_download(stream, &key, blob.as_ref()).await {
                        Ok(bytes) => {
                            tracing::info!(port, key = %key, bytes, "transfer completed")
                        }
                        Err(e) => tracing::error!(port, key = %key, err = %e, "download failed"),
                    }
                }
                Err(e) => tracing::error!(port, err = %e, "accept failed"),
            }

            registry.remove(port);
        })
    }

    async fn handle_download(
        mut stream: TcpStream,
        key: &str,
        blob: &dyn BlobStore,
    ) -> Result<u64> {
        let data = blob.get(key).await?;
        let size = data.len() as u64;
        wire::send_payload(&mut stream, &data).await?;
        Ok(size)
    }
}
