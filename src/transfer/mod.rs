//! Length-prefixed binary transfer protocol.
//!
//! Whole files move over short-lived TCP connections: one frame per
//! connection, the same framing for upload and download.

pub mod client;
pub mod wire;

pub use client::TransferClient;
pub use wire::{recv_payload, send_payload, MAX_PAYLOAD_SIZE};
