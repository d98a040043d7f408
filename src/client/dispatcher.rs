//! Request dispatch.
//!
//! Sends each ChangeRequest over the bus, reads the port map out of the
//! reply, and hands every file off to its own upload task so one slow
//! transfer cannot hold up the rest of the batch. A failed or timed-out
//! dispatch drops the batch: there is no resubmission queue, delivery is
//! at-most-once.

use crate::bus::Bus;
use crate::error::Result;
use crate::message::{subjects, ChangeRequest, ChangeResponse, ServerResponse};
use crate::transfer::TransferClient;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct RequestDispatcher {
    bus: Arc<dyn Bus>,
    host: String,
    timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(bus: Arc<dyn Bus>, host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bus,
            host: host.into(),
            timeout,
        }
    }

    /// Consume batches until the channel closes. Per-batch errors are
    /// logged and the batch dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<ChangeRequest>) {
        while let Some(req) = rx.recv().await {
            let dir = req.dir.clone();
            if let Err(e) = self.dispatch(req).await {
                tracing::error!(dir = %dir.display(), err = %e, "dispatch failed, dropping batch");
            }
        }
    }

    /// Send one ChangeRequest and start an upload task per allocated port.
    pub async fn dispatch(&self, req: ChangeRequest) -> Result<()> {
        let payload = Bytes::from(serde_json::to_vec(&req)?);
        let reply = self
            .bus
            .request(subjects::CHANGE, payload, self.timeout)
            .await?;

        let envelope: ServerResponse = serde_json::from_slice(&reply)?;
        let ports: ChangeResponse = envelope.decode()?;

        for (file_name, port) in ports {
            let path = req.dir.join(&file_name);
            let client = TransferClient::new(self.host.clone());
            tokio::spawn(async move {
                if let Err(e) = client.upload(&path, port).await {
                    tracing::error!(path = %path.display(), port, err = %e, "upload failed");
                }
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use crate::error::SyncError;
    use crate::message::{ChangeSummary, Operation};
    use crate::transfer::wire;
    use chrono::Utc;
    use std::path::PathBuf;
    use tokio::net::TcpListener;

    fn request(dir: &std::path::Path, file_name: &str) -> ChangeRequest {
        ChangeRequest {
            client_id: "c1".to_string(),
            time: Utc::now(),
            agent: "linux".to_string(),
            dir: dir.to_path_buf(),
            changes: vec![ChangeSummary {
                file_name: file_name.to_string(),
                change: Operation::Create,
                agent: "linux".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_dispatch_uploads_to_allocated_port() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"file body")
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let bus = InProcessBus::new();
        let mut sub = bus.subscribe(subjects::CHANGE).await.unwrap();

        // Fake server: reply with a port map pointing at our listener.
        tokio::spawn(async move {
            let mut msg = sub.recv().await.unwrap();
            let mut ports = ChangeResponse::new();
            ports.insert("a.txt".to_string(), port);
            let envelope = ServerResponse::success(&ports).unwrap();
            msg.respond(Bytes::from(serde_json::to_vec(&envelope).unwrap()));
        });

        let receiver = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            wire::recv_payload(&mut stream).await.unwrap()
        });

        let dispatcher = RequestDispatcher::new(bus, "127.0.0.1", Duration::from_secs(3));
        dispatcher
            .dispatch(request(dir.path(), "a.txt"))
            .await
            .unwrap();

        let uploaded = receiver.await.unwrap();
        assert_eq!(uploaded.as_ref(), b"file body");
    }

    #[tokio::test]
    async fn test_dispatch_timeout_surfaces() {
        let bus = InProcessBus::new();
        // Subscriber exists but never replies.
        let _sub = bus.subscribe(subjects::CHANGE).await.unwrap();

        let dispatcher = RequestDispatcher::new(bus, "127.0.0.1", Duration::from_millis(50));
        let err = dispatcher
            .dispatch(request(std::path::Path::new("/tmp"), "a.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RequestTimeout { .. }));
    }

    #[tokio::test]
    async fn test_dispatch_failure_envelope_surfaces() {
        let bus = InProcessBus::new();
        let mut sub = bus.subscribe(subjects::CHANGE).await.unwrap();

        tokio::spawn(async move {
            let mut msg = sub.recv().await.unwrap();
            let envelope = ServerResponse::failure("delete failed for a.txt");
            msg.respond(Bytes::from(serde_json::to_vec(&envelope).unwrap()));
        });

        let dispatcher = RequestDispatcher::new(bus, "127.0.0.1", Duration::from_secs(1));
        let err = dispatcher
            .dispatch(request(std::path::Path::new("/tmp"), "a.txt"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("delete failed"));
    }

    #[tokio::test]
    async fn test_run_continues_after_failed_batch() {
        let bus = InProcessBus::new();
        let mut sub = bus.subscribe(subjects::CHANGE).await.unwrap();

        // First request gets a failure, second a success with no ports.
        tokio::spawn(async move {
            let mut msg = sub.recv().await.unwrap();
            let envelope = ServerResponse::failure("boom");
            msg.respond(Bytes::from(serde_json::to_vec(&envelope).unwrap()));

            let mut msg = sub.recv().await.unwrap();
            let envelope = ServerResponse::success(&ChangeResponse::new()).unwrap();
            msg.respond(Bytes::from(serde_json::to_vec(&envelope).unwrap()));
        });

        let (tx, rx) = mpsc::channel(4);
        let dispatcher = RequestDispatcher::new(bus, "127.0.0.1", Duration::from_secs(1));
        let handle = tokio::spawn(dispatcher.run(rx));

        tx.send(request(std::path::Path::new("/a"), "x.txt"))
            .await
            .unwrap();
        tx.send(request(std::path::Path::new("/b"), "y.txt"))
            .await
            .unwrap();
        drop(tx);

        // Both batches consumed despite the first failing.
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_dir_path() {
        // PathBuf::from("") joined with file name must still resolve.
        let req = request(std::path::Path::new(""), "a.txt");
        assert_eq!(req.dir.join("a.txt"), PathBuf::from("a.txt"));
    }
}
