//! syncher - peer file synchronization.
//!
//! Clients batch filesystem changes into per-directory requests and send
//! them over a message bus; servers allocate ephemeral TCP ports for the
//! actual bytes, persist every accepted change in an append-only log,
//! and answer reconciliation queries so a client that was offline can
//! replay exactly what other agents changed.

pub mod bus;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod server;
pub mod store;
pub mod transfer;

pub use error::{Result, SyncError};
