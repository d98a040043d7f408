//! Append-only change log.
//!
//! One JSON record per line, keyed by client id. The full history is
//! loaded into memory at startup for O(1) lookups; appends go to the
//! file first, then the in-memory index. Entries are never mutated or
//! deleted, so the file only ever grows (no compaction).

use crate::error::{Result, SyncError};
use crate::message::ChangeLogEntry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct ChangeLogStore {
    path: PathBuf,
    // Single lock serializes appends; write concurrency per client is
    // low enough that per-client locking is not worth it.
    inner: Mutex<Inner>,
}

struct Inner {
    by_client: HashMap<String, Vec<ChangeLogEntry>>,
    file: File,
}

impl ChangeLogStore {
    /// Open the log at `path`, creating it if absent, and load the full
    /// history. Malformed lines are skipped rather than failing the load.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let by_client = Self::load(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            inner: Mutex::new(Inner { by_client, file }),
        })
    }

    fn load(path: &Path) -> Result<HashMap<String, Vec<ChangeLogEntry>>> {
        let mut by_client: HashMap<String, Vec<ChangeLogEntry>> = HashMap::new();

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(by_client),
            Err(e) => return Err(e.into()),
        };

        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChangeLogEntry>(&line) {
                Ok(entry) => by_client
                    .entry(entry.client_id.clone())
                    .or_default()
                    .push(entry),
                Err(e) => {
                    tracing::warn!(path = %path.display(), err = %e, "skipping malformed log line")
                }
            }
        }

        Ok(by_client)
    }

    /// Append one entry, durably then in memory.
    pub fn append(&self, entry: ChangeLogEntry) -> Result<()> {
        let line = serde_json::to_string(&entry)?;
        let mut inner = self.inner.lock().expect("change log lock poisoned");

        writeln!(inner.file, "{}", line)?;
        inner.file.flush()?;

        inner
            .by_client
            .entry(entry.client_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    /// Full ordered history for one client.
    pub fn get(&self, client_id: &str) -> Result<Vec<ChangeLogEntry>> {
        let inner = self.inner.lock().expect("change log lock poisoned");
        inner
            .by_client
            .get(client_id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownClient(client_id.to_string()))
    }

    pub fn client_count(&self) -> usize {
        self.inner
            .lock()
            .expect("change log lock poisoned")
            .by_client
            .len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
