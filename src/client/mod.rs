//! Client runtime.
//!
//! Wires the change-event queue into the batcher, the batcher into the
//! dispatcher, and runs the reconciliation poller alongside them:
//!
//! ```text
//! watch -> queue -> ChangeBatcher -> RequestDispatcher -> uploads
//!                        ChangeApplier <- sync poll <- server
//! ```

pub mod apply;
pub mod batcher;
pub mod dispatcher;
pub mod queue;
#[cfg(feature = "watch")]
pub mod watch;

pub use apply::ChangeApplier;
pub use batcher::ChangeBatcher;
pub use dispatcher::RequestDispatcher;
pub use queue::{change_event_channel, ChangeEventReceiver, ChangeEventSender};

use crate::bus::Bus;
use crate::config::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Requests buffered between batcher and dispatcher.
const REQUEST_CHANNEL_SIZE: usize = 16;

pub struct Client {
    cfg: Arc<ClientConfig>,
    bus: Arc<dyn Bus>,
}

impl Client {
    pub fn new(cfg: ClientConfig, bus: Arc<dyn Bus>) -> Self {
        Self {
            cfg: Arc::new(cfg),
            bus,
        }
    }

    /// Create the change-event queue sized from the config. The sender
    /// goes to the watch source, the receiver to [`Client::start`].
    pub fn queue(&self) -> (ChangeEventSender, ChangeEventReceiver) {
        change_event_channel(self.cfg.queue_capacity)
    }

    /// Spawn the batcher, dispatcher and sync poller. Tasks run until
    /// the event queue closes (batcher/dispatcher) or the handles are
    /// aborted (poller).
    pub fn start(&self, events: ChangeEventReceiver) -> Vec<JoinHandle<()>> {
        let interval = Duration::from_secs(self.cfg.sync_interval_secs);
        let timeout = Duration::from_secs(self.cfg.request_timeout_secs);

        let (req_tx, req_rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);

        let batcher = ChangeBatcher::new(
            self.cfg.client_id.clone(),
            self.cfg.agent.clone(),
            interval,
            self.cfg.batch_high_water,
        );
        let dispatcher = RequestDispatcher::new(
            self.bus.clone(),
            self.cfg.server_host.clone(),
            timeout,
        );
        let applier = ChangeApplier::new(
            self.cfg.client_id.clone(),
            self.cfg.agent.clone(),
            self.bus.clone(),
            self.cfg.server_host.clone(),
            timeout,
        );

        tracing::info!(
            client_id = %self.cfg.client_id,
            agent = %self.cfg.agent,
            "client starting"
        );

        vec![
            tokio::spawn(batcher.run(events, req_tx)),
            tokio::spawn(dispatcher.run(req_rx)),
            tokio::spawn(applier.run(interval)),
        ]
    }
}
