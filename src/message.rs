//! Bus payload types.
//!
//! Every message exchanged over the bus is JSON. Replies travel inside a
//! `ServerResponse` envelope whose `data` field is itself JSON-encoded;
//! the double encoding matches the wire format of existing deployments,
//! so callers must go through [`ServerResponse::decode`] rather than
//! deserializing the payload directly.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A single filesystem mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Modify,
    Delete,
}

impl Operation {
    /// Whether this operation moves file bytes and therefore needs a
    /// transfer port. Deletes are administrative only.
    pub fn needs_transfer(&self) -> bool {
        !matches!(self, Operation::Delete)
    }
}

/// A raw filesystem event from the watch source. Consumed exactly once by
/// the batcher; never persisted directly.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub dir: PathBuf,
    pub file_name: String,
    pub op: Operation,
    pub time: DateTime<Utc>,
}

/// One change inside a request or log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub file_name: String,
    pub change: Operation,
    pub agent: String,
}

/// A batch of changes for one directory, sent client -> server on the
/// `change` subject. Arrival is the atomicity boundary: the request is
/// processed as a whole, each change resolved in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub client_id: String,
    pub time: DateTime<Utc>,
    pub agent: String,
    pub dir: PathBuf,
    pub changes: Vec<ChangeSummary>,
}

/// Reply to a ChangeRequest: which port each non-delete file should be
/// pushed to.
pub type ChangeResponse = HashMap<String, u16>;

/// A reconciliation query, sent on the `sync` subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub client_id: String,
    pub time: DateTime<Utc>,
    pub agent: String,
}

/// One directory's worth of changes the requester has not applied yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub dir: PathBuf,
    pub changes: Vec<ChangeSummary>,
}

/// Request for a download port for one stored blob (`download-file`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub client_id: String,
    pub time: DateTime<Utc>,
    pub agent: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub port: u16,
}

/// Append-only record of one accepted ChangeRequest. Written exclusively
/// by the change handler, replicated to peers on `server-change`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub client_id: String,
    pub server_id: String,
    pub change_dir: PathBuf,
    pub changes: Vec<ChangeSummary>,
    pub time: DateTime<Utc>,
}

impl ChangeLogEntry {
    pub fn from_request(req: &ChangeRequest, server_id: &str) -> Self {
        Self {
            client_id: req.client_id.clone(),
            server_id: server_id.to_string(),
            change_dir: req.dir.clone(),
            changes: req.changes.clone(),
            time: Utc::now(),
        }
    }
}

// =============================================================================
// Reply envelope
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// The reply envelope for every request/reply subject. `data` holds a
/// JSON-encoded payload (or a bare error message on failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse {
    pub status: ResponseStatus,
    pub data: String,
}

impl ServerResponse {
    /// Wrap a payload, JSON-encoding it into `data`.
    pub fn success<T: Serialize>(payload: &T) -> Result<Self> {
        Ok(Self {
            status: ResponseStatus::Success,
            data: serde_json::to_string(payload)?,
        })
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failure,
            data: message.into(),
        }
    }

    /// Unwrap the inner payload, surfacing failure envelopes as errors.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match self.status {
            ResponseStatus::Success => Ok(serde_json::from_str(&self.data)?),
            ResponseStatus::Failure => Err(SyncError::ServerFailure(self.data.clone())),
        }
    }
}

/// Subject names shared by client and server.
pub mod subjects {
    pub const CHANGE: &str = "change";
    pub const SYNC: &str = "sync";
    pub const DOWNLOAD_FILE: &str = "download-file";
    pub const SERVER_CHANGE: &str = "server-change";
    pub const HEALTH: &str = "health";
}

/// Key under which a file's bytes live in the blob store. The original
/// deployments concatenated `client_id + dir + "/" + file_name`; keep
/// that shape so logs and blobs stay addressable across versions.
pub fn blob_key(client_id: &str, dir: &std::path::Path, file_name: &str) -> String {
    format!("{}{}/{}", client_id, dir.display(), file_name)
}
