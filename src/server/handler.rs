//! Server-side request handlers.
//!
//! One handler per bus subject. Each change inside a request is resolved
//! in order: deletes go straight to the blob store, creates/modifies get
//! an ephemeral receiver port. A failing change aborts the whole request
//! (no partial ChangeResponse is returned); this keeps the client-visible
//! semantics of existing deployments.

use crate::bus::Bus;
use crate::error::{Result, SyncError};
use crate::message::{
    blob_key, subjects, ChangeLogEntry, ChangeRequest, ChangeResponse, DownloadRequest,
    DownloadResponse, SyncRequest, SyncResponse,
};
use crate::server::allocator::{PortAllocator, TransferRegistry};
use crate::server::receiver::{DownloaderService, ReceiverService};
use crate::server::reconcile;
use crate::store::{BlobStore, ChangeLogStore};
use bytes::Bytes;
use std::sync::Arc;

pub struct ChangeHandler {
    server_id: String,
    allocator: PortAllocator,
    registry: TransferRegistry,
    blob: Arc<dyn BlobStore>,
    log: Arc<ChangeLogStore>,
    bus: Arc<dyn Bus>,
}

impl ChangeHandler {
    pub fn new(
        server_id: String,
        allocator: PortAllocator,
        blob: Arc<dyn BlobStore>,
        log: Arc<ChangeLogStore>,
        bus: Arc<dyn Bus>,
    ) -> Self {
        Self {
            server_id,
            allocator,
            registry: TransferRegistry::new(),
            blob,
            log,
            bus,
        }
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    /// Handle one ChangeRequest: allocate receiver ports for every
    /// non-delete change, remove blobs for deletes, then record the
    /// whole batch in the change log and broadcast it to peer servers.
    pub async fn handle_change(&self, req: ChangeRequest) -> Result<ChangeResponse> {
        let mut ports = ChangeResponse::new();

        for change in &req.changes {
            let key = blob_key(&req.client_id, &req.dir, &change.file_name);

            if !change.change.needs_transfer() {
                self.blob.delete(&key).await.map_err(|e| SyncError::Delete {
                    file: change.file_name.clone(),
                    source: Box::new(e),
                })?;
                continue;
            }

            let (port, listener) = self.allocator.bind().await?;
            self.registry.insert(port, key.clone());
            ReceiverService::spawn(
                listener,
                port,
                key,
                self.blob.clone(),
                self.registry.clone(),
            );
            ports.insert(change.file_name.clone(), port);
        }

        let entry = ChangeLogEntry::from_request(&req, &self.server_id);
        self.log.append(entry.clone())?;

        let payload = Bytes::from(serde_json::to_vec(&entry)?);
        self.bus.publish(subjects::SERVER_CHANGE, payload).await?;

        Ok(ports)
    }

    /// Answer a reconciliation query from the client's logged history.
    pub async fn handle_sync(&self, req: SyncRequest) -> Result<Vec<SyncResponse>> {
        let history = self.log.get(&req.client_id)?;
        Ok(reconcile::reconcile(&history, &req.agent))
    }

    /// Open a downloader port for one stored blob.
    pub async fn handle_download(&self, req: DownloadRequest) -> Result<DownloadResponse> {
        let (port, listener) = self.allocator.bind().await?;
        self.registry.insert(port, req.file_path.clone());
        DownloaderService::spawn(
            listener,
            port,
            req.file_path,
            self.blob.clone(),
            self.registry.clone(),
        );
        Ok(DownloadResponse { port })
    }

    /// Apply a peer server's broadcast log entry. Our own broadcasts come
    /// back to us on the same subject and are ignored.
    pub async fn handle_server_change(&self, entry: ChangeLogEntry) -> Result<()> {
        if entry.server_id == self.server_id {
            return Ok(());
        }
        tracing::debug!(
            client_id = %entry.client_id,
            server_id = %entry.server_id,
            "replicating peer log entry"
        );
        self.log.append(entry)
    }
}
