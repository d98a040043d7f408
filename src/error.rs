//! Error types for syncher.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("no subscriber for subject '{0}'")]
    NoSubscriber(String),

    #[error("request to subject '{subject}' timed out after {timeout_ms}ms")]
    RequestTimeout { subject: String, timeout_ms: u64 },

    #[error("unknown subject '{0}'")]
    UnknownSubject(String),

    #[error("failed to find an available port after {0} attempts")]
    PortExhausted(u32),

    #[error("failed to delete '{file}': {source}")]
    Delete {
        file: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("blob '{0}' not found")]
    BlobNotFound(String),

    #[error("blob key '{0}' is invalid")]
    InvalidBlobKey(String),

    #[error("no change history for client '{0}'")]
    UnknownClient(String),

    #[error("server returned failure: {0}")]
    ServerFailure(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("transfer of '{path}' failed: {reason}")]
    Transfer { path: PathBuf, reason: String },

    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Whether the error is a transient bind conflict worth retrying
    /// with a different port.
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, SyncError::Io(e) if e.kind() == std::io::ErrorKind::AddrInUse)
    }
}
