//! Wire framing for file transfers.
//!
//! One frame per connection, identical in both directions:
//!
//! ```text
//! [8 bytes, big-endian i64: payload length N]
//! [N bytes: raw file content]
//! ```
//!
//! The declared length and the bytes moved must match exactly; a short
//! read or write is a protocol violation, never a partial success.

use crate::error::{Result, SyncError};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum accepted payload (1GB) - prevents OOM from corrupted prefixes.
pub const MAX_PAYLOAD_SIZE: i64 = 1024 * 1024 * 1024;

/// Write one length-prefixed frame.
pub async fn send_payload<W: AsyncWrite + Unpin>(w: &mut W, data: &[u8]) -> Result<()> {
    w.write_i64(data.len() as i64).await?;
    w.write_all(data).await?;
    w.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn recv_payload<R: AsyncRead + Unpin>(r: &mut R) -> Result<Bytes> {
    let len = r.read_i64().await?;

    if len < 0 {
        return Err(SyncError::Protocol(format!(
            "negative payload length {}",
            len
        )));
    }
    if len > MAX_PAYLOAD_SIZE {
        return Err(SyncError::Protocol(format!(
            "payload length {} exceeds maximum {}",
            len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await.map_err(|e| {
        SyncError::Protocol(format!("short read: expected {} bytes: {}", len, e))
    })?;

    Ok(Bytes::from(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_in_memory() {
        for size in [0usize, 1, 65536] {
            let data = vec![0xABu8; size];
            let mut writer = std::io::Cursor::new(Vec::new());
            send_payload(&mut writer, &data).await.unwrap();
            let buf = writer.into_inner();
            assert_eq!(buf.len(), 8 + size);

            let mut cursor = std::io::Cursor::new(buf);
            let out = recv_payload(&mut cursor).await.unwrap();
            assert_eq!(out.as_ref(), data.as_slice());
        }
    }

    #[tokio::test]
    async fn test_prefix_is_big_endian() {
        let mut writer = std::io::Cursor::new(Vec::new());
        send_payload(&mut writer, b"hi").await.unwrap();
        let buf = writer.into_inner();
        assert_eq!(&buf[..8], &2i64.to_be_bytes());
    }

    #[tokio::test]
    async fn test_negative_length_rejected() {
        let mut frame = (-1i64).to_be_bytes().to_vec();
        frame.extend_from_slice(b"junk");
        let mut cursor = std::io::Cursor::new(frame);
        let err = recv_payload(&mut cursor).await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let frame = (MAX_PAYLOAD_SIZE + 1).to_be_bytes().to_vec();
        let mut cursor = std::io::Cursor::new(frame);
        let err = recv_payload(&mut cursor).await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_hard_failure() {
        let mut frame = 10i64.to_be_bytes().to_vec();
        frame.extend_from_slice(b"only5");
        let mut cursor = std::io::Cursor::new(frame);
        let err = recv_payload(&mut cursor).await.unwrap_err();
        match err {
            SyncError::Protocol(msg) => assert!(msg.contains("short read")),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }
}
