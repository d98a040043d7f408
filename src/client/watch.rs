//! Filesystem watch adapter.
//!
//! Bridges notify's callback thread into the bounded change-event queue.
//! `blocking_send` gives the queue its overflow policy for free: when
//! the batcher falls behind, the watch thread waits instead of dropping
//! events.

use crate::client::queue::ChangeEventSender;
use crate::error::{Result, SyncError};
use crate::message::{ChangeEvent, Operation};
use chrono::Utc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

pub struct WatchService {
    // Watching stops when the service is dropped.
    _watcher: RecommendedWatcher,
}

impl WatchService {
    /// Watch `dirs` recursively, feeding events into `tx`.
    pub fn start(dirs: &[PathBuf], tx: ChangeEventSender) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if let Some(change) = to_change_event(&event) {
                        if tx.blocking_send(change).is_err() {
                            tracing::warn!("change queue closed, dropping watch event");
                        }
                    }
                }
                Err(e) => tracing::error!(err = %e, "watch error"),
            }
        })
        .map_err(|e| SyncError::Config(format!("cannot create watcher: {}", e)))?;

        for dir in dirs {
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .map_err(|e| SyncError::Config(format!("cannot watch {}: {}", dir.display(), e)))?;
            tracing::info!(dir = %dir.display(), "watching");
        }

        Ok(Self { _watcher: watcher })
    }
}

/// Map a notify event to a change event. Events without a usable path or
/// kind (access notifications, rescans) are ignored.
fn to_change_event(event: &Event) -> Option<ChangeEvent> {
    let op = match event.kind {
        EventKind::Create(_) => Operation::Create,
        EventKind::Modify(_) => Operation::Modify,
        EventKind::Remove(_) => Operation::Delete,
        _ => return None,
    };

    let path = event.paths.first()?;
    let (dir, file_name) = split_path(path)?;

    Some(ChangeEvent {
        dir,
        file_name,
        op,
        time: Utc::now(),
    })
}

fn split_path(path: &Path) -> Option<(PathBuf, String)> {
    let file_name = path.file_name()?.to_string_lossy().into_owned();
    let dir = path.parent()?.to_path_buf();
    Some((dir, file_name))
}
