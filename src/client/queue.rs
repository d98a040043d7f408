//! Change-event queue.
//!
//! Bounded producer/consumer buffer between the watch source and the
//! batcher. One producer (the watcher), one consumer (the batcher).
//! Overflow policy is blocking: a full queue makes the producer wait,
//! events are never dropped.

use crate::message::ChangeEvent;
use tokio::sync::mpsc;

/// Default queue capacity when no config is in play.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

pub type ChangeEventSender = mpsc::Sender<ChangeEvent>;
pub type ChangeEventReceiver = mpsc::Receiver<ChangeEvent>;

/// Create the bounded watcher -> batcher channel.
pub fn change_event_channel(capacity: usize) -> (ChangeEventSender, ChangeEventReceiver) {
    mpsc::channel(capacity.max(1))
}
