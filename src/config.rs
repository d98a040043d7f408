//! Configuration for client and server processes.
//!
//! Both sides read a TOML file; every field has a default so an empty
//! file (or a missing one, via `Default`) yields a working local setup
//! under `~/.syncher`.

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_agent() -> String {
    std::env::consts::OS.to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_sync_interval() -> u64 {
    5
}

fn default_high_water() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    100
}

fn default_port_min() -> u16 {
    3000
}

fn default_port_max() -> u16 {
    8000
}

fn default_bind_attempts() -> u32 {
    10
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".syncher")
}

fn default_request_timeout() -> u64 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_id")]
    pub client_id: String,

    /// Identifier of the originating process instance, recorded with every
    /// change so a client never receives its own changes back.
    #[serde(default = "default_agent")]
    pub agent: String,

    /// Directories to watch and synchronize.
    #[serde(default)]
    pub sync_dirs: Vec<PathBuf>,

    /// Host transfer connections are dialed against.
    #[serde(default = "default_host")]
    pub server_host: String,

    /// Seconds between periodic flushes and sync polls.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Pending-event count that triggers an out-of-band flush.
    #[serde(default = "default_high_water")]
    pub batch_high_water: usize,

    /// Bounded capacity of the change-event queue. Producers block when
    /// it is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds to wait for a bus reply before giving up on a batch.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty client config must deserialize")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_id")]
    pub server_id: String,

    /// Root for the blob area and the change log.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Inclusive lower bound of the ephemeral port range.
    #[serde(default = "default_port_min")]
    pub port_min: u16,

    /// Exclusive upper bound of the ephemeral port range.
    #[serde(default = "default_port_max")]
    pub port_max: u16,

    /// Bind attempts before a request fails with port exhaustion.
    #[serde(default = "default_bind_attempts")]
    pub bind_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty server config must deserialize")
    }
}

impl ServerConfig {
    pub fn blob_root(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn change_log_path(&self) -> PathBuf {
        self.data_dir.join("changes.json")
    }
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SyncError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    toml::from_str(&raw).map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path)
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.sync_interval_secs, 5);
        assert_eq!(cfg.batch_high_water, 10);
        assert_eq!(cfg.queue_capacity, 100);
        assert!(!cfg.client_id.is_empty());

        let cfg = ServerConfig::default();
        assert_eq!(cfg.port_min, 3000);
        assert_eq!(cfg.port_max, 8000);
        assert_eq!(cfg.bind_attempts, 10);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "server_id = \"srv-1\"\nport_min = 4000\n").unwrap();

        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.server_id, "srv-1");
        assert_eq!(cfg.port_min, 4000);
        assert_eq!(cfg.port_max, 8000);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load(Path::new("/nonexistent/server.toml")).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
