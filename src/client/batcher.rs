//! Change batching.
//!
//! Turns the stream of individual filesystem events into per-directory
//! ChangeRequests, amortizing bus round-trips. Flushes on a periodic
//! tick and out-of-band when the pending count crosses the high-water
//! mark. A flush drains only what is already queued and is a no-op when
//! nothing is pending; the single batcher task means flushes can never
//! overlap.

use crate::client::queue::ChangeEventReceiver;
use crate::message::{ChangeEvent, ChangeRequest, ChangeSummary};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct ChangeBatcher {
    client_id: String,
    agent: String,
    interval: Duration,
    high_water: usize,
}

impl ChangeBatcher {
    pub fn new(
        client_id: impl Into<String>,
        agent: impl Into<String>,
        interval: Duration,
        high_water: usize,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            agent: agent.into(),
            interval,
            high_water: high_water.max(1),
        }
    }

    /// Consume events until the queue closes, emitting one ChangeRequest
    /// per directory per flush cycle.
    pub async fn run(self, mut rx: ChangeEventReceiver, out: mpsc::Sender<ChangeRequest>) {
        let mut pending: Vec<ChangeEvent> = Vec::new();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.drain(&mut rx, &mut pending);
                    self.flush(&mut pending, &out).await;
                }
                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            pending.push(event);
                            if pending.len() >= self.high_water {
                                self.drain(&mut rx, &mut pending);
                                self.flush(&mut pending, &out).await;
                            }
                        }
                        None => {
                            // Watcher gone; flush what is left and stop.
                            self.flush(&mut pending, &out).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Pull whatever is already queued without waiting for new arrivals.
    fn drain(&self, rx: &mut ChangeEventReceiver, pending: &mut Vec<ChangeEvent>) {
        while let Ok(event) = rx.try_recv() {
            pending.push(event);
        }
    }

    async fn flush(&self, pending: &mut Vec<ChangeEvent>, out: &mpsc::Sender<ChangeRequest>) {
        for req in self.group(std::mem::take(pending)) {
            tracing::debug!(
                dir = %req.dir.display(),
                changes = req.changes.len(),
                "flushing change batch"
            );
            if out.send(req).await.is_err() {
                return;
            }
        }
    }

    /// Group events by directory, preserving per-directory insertion
    /// order of filenames. Empty input produces no requests.
    pub fn group(&self, events: Vec<ChangeEvent>) -> Vec<ChangeRequest> {
        let mut by_dir: HashMap<PathBuf, Vec<ChangeSummary>> = HashMap::new();
        let mut dir_order: Vec<PathBuf> = Vec::new();

        for event in events {
            if !by_dir.contains_key(&event.dir) {
                dir_order.push(event.dir.clone());
            }
            by_dir.entry(event.dir).or_default().push(ChangeSummary {
                file_name: event.file_name,
                change: event.op,
                agent: self.agent.clone(),
            });
        }

        dir_order
            .into_iter()
            .map(|dir| {
                let changes = by_dir.remove(&dir).unwrap_or_default();
                ChangeRequest {
                    client_id: self.client_id.clone(),
                    time: Utc::now(),
                    agent: self.agent.clone(),
                    dir,
                    changes,
                }
            })
            .collect()
    }
}
