//! Server runtime.
//!
//! Subscribes to every bus subject, dispatches each inbound message on
//! its own task, and turns handler errors into failure envelopes so
//! callers never time out on a processable request.

pub mod allocator;
pub mod handler;
pub mod receiver;
pub mod reconcile;

pub use allocator::{PortAllocator, TransferRegistry};
pub use handler::ChangeHandler;
pub use receiver::{DownloaderService, ReceiverService};

use crate::bus::{Bus, BusMessage};
use crate::config::ServerConfig;
use crate::error::{Result, SyncError};
use crate::message::{subjects, ServerResponse};
use crate::store::{BlobStore, ChangeLogStore, FsBlobStore};
use bytes::Bytes;
use std::sync::Arc;

/// The closed set of commands a server answers. Subjects resolve to a
/// command at dispatch time; anything else is an error, same as the
/// historical dynamic dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Change,
    Sync,
    DownloadFile,
    ServerChange,
    Health,
}

impl Command {
    const ALL: [(&'static str, Command); 5] = [
        (subjects::CHANGE, Command::Change),
        (subjects::SYNC, Command::Sync),
        (subjects::DOWNLOAD_FILE, Command::DownloadFile),
        (subjects::SERVER_CHANGE, Command::ServerChange),
        (subjects::HEALTH, Command::Health),
    ];

    fn from_subject(subject: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|(name, _)| *name == subject)
            .map(|(_, cmd)| *cmd)
            .ok_or_else(|| SyncError::UnknownSubject(subject.to_string()))
    }
}

pub struct Server {
    cfg: Arc<ServerConfig>,
    bus: Arc<dyn Bus>,
    handler: Arc<ChangeHandler>,
}

impl Server {
    /// Build a server with filesystem-backed stores under the configured
    /// data directory.
    pub fn new(cfg: ServerConfig, bus: Arc<dyn Bus>) -> Result<Self> {
        let blob: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(cfg.blob_root()));
        let log = Arc::new(ChangeLogStore::open(cfg.change_log_path())?);
        Ok(Self::with_stores(cfg, bus, blob, log))
    }

    /// Build a server over explicit store implementations.
    pub fn with_stores(
        cfg: ServerConfig,
        bus: Arc<dyn Bus>,
        blob: Arc<dyn BlobStore>,
        log: Arc<ChangeLogStore>,
    ) -> Self {
        let allocator = PortAllocator::new(cfg.port_min, cfg.port_max, cfg.bind_attempts);
        let handler = Arc::new(ChangeHandler::new(
            cfg.server_id.clone(),
            allocator,
            blob,
            log,
            bus.clone(),
        ));
        Self {
            cfg: Arc::new(cfg),
            bus,
            handler,
        }
    }

    pub fn handler(&self) -> Arc<ChangeHandler> {
        self.handler.clone()
    }

    /// Subscribe to every subject and serve until the process exits.
    /// Returns once all subscriptions are in place; message handling
    /// continues on background tasks.
    pub async fn start(&self) -> Result<()> {
        tracing::info!(server_id = %self.cfg.server_id, "server starting");

        for (subject, _) in Command::ALL {
            let mut sub = self.bus.subscribe(subject).await?;
            let handler = self.handler.clone();

            tokio::spawn(async move {
                while let Some(msg) = sub.recv().await {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        Self::handle_message(handler, msg).await;
                    });
                }
            });
            tracing::info!(subject, "subscribed");
        }

        Ok(())
    }

    async fn handle_message(handler: Arc<ChangeHandler>, mut msg: BusMessage) {
        let subject = msg.subject.clone();
        let response = match Self::dispatch(&handler, &subject, &msg.payload).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(subject = %subject, err = %e, "handler failed");
                Some(ServerResponse::failure(format!("{}: {}", subject, e)))
            }
        };

        if let Some(response) = response {
            match serde_json::to_vec(&response) {
                Ok(data) => msg.respond(Bytes::from(data)),
                Err(e) => tracing::error!(subject = %subject, err = %e, "reply encode failed"),
            }
        }
    }

    /// Route one message. Broadcast subjects return `None` (no reply).
    async fn dispatch(
        handler: &ChangeHandler,
        subject: &str,
        payload: &[u8],
    ) -> Result<Option<ServerResponse>> {
        match Command::from_subject(subject)? {
            Command::Change => {
                let req = serde_json::from_slice(payload)?;
                let ports = handler.handle_change(req).await?;
                Ok(Some(ServerResponse::success(&ports)?))
            }
            Command::Sync => {
                let req = serde_json::from_slice(payload)?;
                let responses = handler.handle_sync(req).await?;
                Ok(Some(ServerResponse::success(&responses)?))
            }
            Command::DownloadFile => {
                let req = serde_json::from_slice(payload)?;
                let response = handler.handle_download(req).await?;
                Ok(Some(ServerResponse::success(&response)?))
            }
            Command::ServerChange => {
                let entry = serde_json::from_slice(payload)?;
                handler.handle_server_change(entry).await?;
                Ok(None)
            }
            Command::Health => Ok(Some(ServerResponse::success(&"healthy")?)),
        }
    }
}
