//! Sync reconciliation.
//!
//! Answers "what did I miss": flattens a client's logged history into
//! per-directory buckets and drops every change the requesting agent
//! authored itself, so a client never gets its own changes back.

use crate::message::{ChangeLogEntry, SyncResponse};
use std::collections::HashMap;
use std::path::PathBuf;

/// Group `history` by directory, excluding changes recorded for `agent`.
/// Entry order is preserved within each directory. An all-self history
/// yields an empty list, not an error.
pub fn reconcile(history: &[ChangeLogEntry], agent: &str) -> Vec<SyncResponse> {
    let mut by_dir: HashMap<PathBuf, Vec<crate::message::ChangeSummary>> = HashMap::new();
    let mut dir_order: Vec<PathBuf> = Vec::new();

    for entry in history {
        for change in &entry.changes {
            if change.agent == agent {
                continue;
            }
            if !by_dir.contains_key(&entry.change_dir) {
                dir_order.push(entry.change_dir.clone());
            }
            by_dir
                .entry(entry.change_dir.clone())
                .or_default()
                .push(change.clone());
        }
    }

    dir_order
        .into_iter()
        .map(|dir| {
            let changes = by_dir.remove(&dir).unwrap_or_default();
            SyncResponse { dir, changes }
        })
        .collect()
}
