//! Message bus seam.
//!
//! The transport itself is a collaborator: the core only needs
//! publish/subscribe plus request/reply with a timeout. External brokers
//! plug in behind [`Bus`]; [`InProcessBus`] carries single-process
//! deployments and the test suite.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Buffered messages per subscription before publishers start waiting.
const SUBSCRIPTION_BUFFER: usize = 64;

/// One inbound message. Request/reply messages carry a one-shot reply
/// slot; broadcast messages do not.
#[derive(Debug)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Bytes,
    reply: Option<oneshot::Sender<Bytes>>,
}

impl BusMessage {
    /// Send a reply to the requester. A no-op for broadcast messages or
    /// if a reply was already sent.
    pub fn respond(&mut self, data: Bytes) {
        if let Some(tx) = self.reply.take() {
            // Requester may have timed out and dropped the receiver.
            let _ = tx.send(data);
        }
    }

    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }
}

/// A stream of messages for one subject.
pub struct Subscription {
    rx: mpsc::Receiver<BusMessage>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait Bus: Send + Sync {
    /// Send `payload` and wait for a single reply, up to `timeout`.
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes>;

    /// Broadcast `payload` to every subscriber of `subject`.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Register interest in `subject`.
    async fn subscribe(&self, subject: &str) -> Result<Subscription>;
}

/// In-process bus: a subject registry of mpsc senders. Requests are
/// delivered to one live subscriber (the queue-group behavior servers
/// expect); publishes fan out to all of them.
#[derive(Default)]
pub struct InProcessBus {
    topics: Mutex<HashMap<String, Vec<mpsc::Sender<BusMessage>>>>,
}

impl InProcessBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Live senders for a subject, dropping any whose subscription has
    /// been closed.
    fn senders(&self, subject: &str) -> Vec<mpsc::Sender<BusMessage>> {
        let mut topics = self.topics.lock().expect("bus registry poisoned");
        if let Some(senders) = topics.get_mut(subject) {
            senders.retain(|tx| !tx.is_closed());
            senders.clone()
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl Bus for InProcessBus {
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        let senders = self.senders(subject);
        let target = senders
            .first()
            .ok_or_else(|| SyncError::NoSubscriber(subject.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let msg = BusMessage {
            subject: subject.to_string(),
            payload,
            reply: Some(reply_tx),
        };
        target
            .send(msg)
            .await
            .map_err(|_| SyncError::NoSubscriber(subject.to_string()))?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(data)) => Ok(data),
            // Subscriber dropped the message without replying.
            Ok(Err(_)) => Err(SyncError::NoSubscriber(subject.to_string())),
            Err(_) => Err(SyncError::RequestTimeout {
                subject: subject.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        for tx in self.senders(subject) {
            let msg = BusMessage {
                subject: subject.to_string(),
                payload: payload.clone(),
                reply: None,
            };
            // A closed subscriber is not the publisher's problem.
            let _ = tx.send(msg).await;
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.topics
            .lock()
            .expect("bus registry poisoned")
            .entry(subject.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription { rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_reply() {
        let bus = InProcessBus::new();
        let mut sub = bus.subscribe("echo").await.unwrap();

        let responder = tokio::spawn(async move {
            let mut msg = sub.recv().await.unwrap();
            assert!(msg.expects_reply());
            let payload = msg.payload.clone();
            msg.respond(payload);
        });

        let reply = bus
            .request("echo", Bytes::from("ping"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, Bytes::from("ping"));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_no_subscriber() {
        let bus = InProcessBus::new();
        let err = bus
            .request("nobody", Bytes::new(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoSubscriber(_)));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let bus = InProcessBus::new();
        // Subscriber that never replies.
        let _sub = bus.subscribe("slow").await.unwrap();
        let err = bus
            .request("slow", Bytes::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RequestTimeout { .. }));
    }

    #[tokio::test]
    async fn test_publish_fan_out() {
        let bus = InProcessBus::new();
        let mut sub1 = bus.subscribe("news").await.unwrap();
        let mut sub2 = bus.subscribe("news").await.unwrap();

        bus.publish("news", Bytes::from("hello")).await.unwrap();

        let m1 = sub1.recv().await.unwrap();
        let m2 = sub2.recv().await.unwrap();
        assert_eq!(m1.payload, Bytes::from("hello"));
        assert_eq!(m2.payload, Bytes::from("hello"));
        assert!(!m1.expects_reply());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = InProcessBus::new();
        let sub = bus.subscribe("gone").await.unwrap();
        drop(sub);

        let err = bus
            .request("gone", Bytes::new(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoSubscriber(_)));
    }
}
