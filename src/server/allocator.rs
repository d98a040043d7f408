//! Ephemeral port allocation.
//!
//! Each Create/Modify change gets its own short-lived TCP listener on a
//! random port from a fixed range. Bind conflicts are retried with a
//! fresh random port up to a fixed attempt budget; any other bind error
//! aborts the whole request.

use crate::error::{Result, SyncError};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub struct PortAllocator {
    min: u16,
    max: u16,
    attempts: u32,
}

impl PortAllocator {
    /// `min..max` is the candidate range, `attempts` the bind budget.
    pub fn new(min: u16, max: u16, attempts: u32) -> Self {
        debug_assert!(min < max);
        Self { min, max, attempts }
    }

    /// Bind a listener on a random free port from the range.
    pub async fn bind(&self) -> Result<(u16, TcpListener)> {
        for _ in 0..self.attempts {
            let port = rand::thread_rng().gen_range(self.min..self.max);
            match TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => return Ok((port, listener)),
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    tracing::debug!(port, "port in use, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SyncError::PortExhausted(self.attempts))
    }
}

/// Active transfers, port -> blob key. Exists for observability; the
/// invariant is that a port key is present iff its listener is open.
#[derive(Clone, Default)]
pub struct TransferRegistry {
    transfers: Arc<Mutex<HashMap<u16, String>>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, port: u16, key: String) {
        self.transfers
            .lock()
            .expect("transfer registry poisoned")
            .insert(port, key);
    }

    pub fn remove(&self, port: u16) -> Option<String> {
        self.transfers
            .lock()
            .expect("transfer registry poisoned")
            .remove(&port)
    }

    pub fn contains(&self, port: u16) -> bool {
        self.transfers
            .lock()
            .expect("transfer registry poisoned")
            .contains_key(&port)
    }

    pub fn len(&self) -> usize {
        self.transfers
            .lock()
            .expect("transfer registry poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
