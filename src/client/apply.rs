//! Remote-change application.
//!
//! The pull half of the client: periodically asks the server what other
//! agents changed, downloads the bytes for creates/modifies, and removes
//! files for deletes. Failures are logged and skipped; the next poll
//! sees the history again.

use crate::bus::Bus;
use crate::error::Result;
use crate::message::{
    blob_key, subjects, ChangeSummary, DownloadRequest, DownloadResponse, ServerResponse,
    SyncRequest, SyncResponse,
};
use crate::transfer::TransferClient;
use bytes::Bytes;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct ChangeApplier {
    client_id: String,
    agent: String,
    bus: Arc<dyn Bus>,
    transfer: TransferClient,
    timeout: Duration,
}

impl ChangeApplier {
    pub fn new(
        client_id: impl Into<String>,
        agent: impl Into<String>,
        bus: Arc<dyn Bus>,
        host: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            agent: agent.into(),
            bus,
            transfer: TransferClient::new(host),
            timeout,
        }
    }

    /// Poll on `interval` until the task is dropped.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                tracing::warn!(err = %e, "sync poll failed");
            }
        }
    }

    /// One reconciliation round: fetch missed changes, apply each one.
    pub async fn poll_once(&self) -> Result<usize> {
        let req = SyncRequest {
            client_id: self.client_id.clone(),
            time: Utc::now(),
            agent: self.agent.clone(),
        };
        let payload = Bytes::from(serde_json::to_vec(&req)?);
        let reply = self.bus.request(subjects::SYNC, payload, self.timeout).await?;

        let envelope: ServerResponse = serde_json::from_slice(&reply)?;
        let responses: Vec<SyncResponse> = envelope.decode()?;

        let mut applied = 0;
        for response in &responses {
            for change in &response.changes {
                // The server already filters by agent; keep the check as
                // the last line of defense against echoing our own writes.
                if change.agent == self.agent {
                    continue;
                }
                match self.apply(&response.dir, change).await {
                    Ok(()) => applied += 1,
                    Err(e) => tracing::warn!(
                        file = %change.file_name,
                        err = %e,
                        "failed to apply remote change"
                    ),
                }
            }
        }
        Ok(applied)
    }

    async fn apply(&self, dir: &Path, change: &ChangeSummary) -> Result<()> {
        let local_path = dir.join(&change.file_name);

        if !change.change.needs_transfer() {
            tracing::info!(path = %local_path.display(), "removing file deleted elsewhere");
            tokio::fs::remove_file(&local_path).await?;
            return Ok(());
        }

        let req = DownloadRequest {
            client_id: self.client_id.clone(),
            time: Utc::now(),
            agent: self.agent.clone(),
            file_path: blob_key(&self.client_id, dir, &change.file_name),
        };
        let payload = Bytes::from(serde_json::to_vec(&req)?);
        let reply = self
            .bus
            .request(subjects::DOWNLOAD_FILE, payload, self.timeout)
            .await?;

        let envelope: ServerResponse = serde_json::from_slice(&reply)?;
        let download: DownloadResponse = envelope.decode()?;

        let data = self.transfer.download(download.port).await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&local_path, &data).await?;
        tracing::info!(path = %local_path.display(), bytes = data.len(), "applied remote change");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use crate::message::Operation;
    use crate::transfer::wire;
    use tokio::net::TcpListener;

    /// Fake server answering one sync poll and serving one download.
    async fn fake_server(
        bus: Arc<InProcessBus>,
        responses: Vec<SyncResponse>,
        file_bytes: Option<&'static [u8]>,
    ) {
        let mut sync_sub = bus.subscribe(subjects::SYNC).await.unwrap();
        let mut dl_sub = bus.subscribe(subjects::DOWNLOAD_FILE).await.unwrap();

        tokio::spawn(async move {
            let mut msg = sync_sub.recv().await.unwrap();
            let envelope = ServerResponse::success(&responses).unwrap();
            msg.respond(Bytes::from(serde_json::to_vec(&envelope).unwrap()));
        });

        if let Some(bytes) = file_bytes {
            tokio::spawn(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let port = listener.local_addr().unwrap().port();

                let mut msg = dl_sub.recv().await.unwrap();
                let envelope = ServerResponse::success(&DownloadResponse { port }).unwrap();
                msg.respond(Bytes::from(serde_json::to_vec(&envelope).unwrap()));

                let (mut stream, _) = listener.accept().await.unwrap();
                wire::send_payload(&mut stream, bytes).await.unwrap();
            });
        }
    }

    fn applier(bus: Arc<InProcessBus>) -> ChangeApplier {
        ChangeApplier::new("c1", "B", bus, "127.0.0.1", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_applies_create_from_other_agent() {
        let dir = tempfile::tempdir().unwrap();
        let bus = InProcessBus::new();

        fake_server(
            bus.clone(),
            vec![SyncResponse {
                dir: dir.path().to_path_buf(),
                changes: vec![ChangeSummary {
                    file_name: "foo.txt".to_string(),
                    change: Operation::Create,
                    agent: "A".to_string(),
                }],
            }],
            Some(b"from agent A"),
        )
        .await;

        let applied = applier(bus).poll_once().await.unwrap();
        assert_eq!(applied, 1);
        let content = tokio::fs::read(dir.path().join("foo.txt")).await.unwrap();
        assert_eq!(content, b"from agent A");
    }

    #[tokio::test]
    async fn test_skips_own_agent_changes() {
        let dir = tempfile::tempdir().unwrap();
        let bus = InProcessBus::new();

        fake_server(
            bus.clone(),
            vec![SyncResponse {
                dir: dir.path().to_path_buf(),
                changes: vec![ChangeSummary {
                    file_name: "mine.txt".to_string(),
                    change: Operation::Create,
                    agent: "B".to_string(),
                }],
            }],
            None,
        )
        .await;

        let applied = applier(bus).poll_once().await.unwrap();
        assert_eq!(applied, 0);
        assert!(!dir.path().join("mine.txt").exists());
    }

    #[tokio::test]
    async fn test_applies_delete() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gone.txt");
        tokio::fs::write(&target, b"x").await.unwrap();

        let bus = InProcessBus::new();
        fake_server(
            bus.clone(),
            vec![SyncResponse {
                dir: dir.path().to_path_buf(),
                changes: vec![ChangeSummary {
                    file_name: "gone.txt".to_string(),
                    change: Operation::Delete,
                    agent: "A".to_string(),
                }],
            }],
            None,
        )
        .await;

        let applied = applier(bus).poll_once().await.unwrap();
        assert_eq!(applied, 1);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_failure_envelope_surfaces() {
        let bus = InProcessBus::new();
        let mut sync_sub = bus.subscribe(subjects::SYNC).await.unwrap();
        tokio::spawn(async move {
            let mut msg = sync_sub.recv().await.unwrap();
            let envelope = ServerResponse::failure("no change history for client 'c1'");
            msg.respond(Bytes::from(serde_json::to_vec(&envelope).unwrap()));
        });

        let err = applier(bus).poll_once().await.unwrap_err();
        assert!(err.to_string().contains("no change history"));
    }
}
