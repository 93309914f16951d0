//! Length-Prefixed Framing
//!
//! One frame is a 4-byte big-endian length followed by exactly that many
//! payload bytes. Framing owns no policy: callers decide how many frames an
//! interaction uses. The length prefix is checked against the caller's
//! maximum before any buffer is grown, so a hostile prefix costs nothing.

use crate::{Result, TransportError};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Width of the length prefix in bytes
pub const FRAME_PREFIX_LEN: usize = 4;

/// Default maximum payload size (1MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Fill `dst` completely, returning how many bytes arrived before EOF on failure
async fn read_full<R>(reader: &mut R, dst: &mut [u8]) -> std::result::Result<(), ReadShort>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < dst.len() {
        match reader.read(&mut dst[filled..]).await {
            Ok(0) => return Err(ReadShort::Eof(filled)),
            Ok(n) => filled += n,
            Err(e) => return Err(ReadShort::Io(e)),
        }
    }
    Ok(())
}

enum ReadShort {
    Eof(usize),
    Io(std::io::Error),
}

/// Read one frame into `buf`, returning the payload
///
/// `buf` is cleared first and holds exactly the payload afterwards; the
/// returned slice borrows it, so the payload cannot be used once the buffer
/// goes back to its pool.
pub async fn read_frame<'a, R>(
    reader: &mut R,
    buf: &'a mut BytesMut,
    max_size: usize,
) -> Result<&'a [u8]>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_bytes = [0u8; FRAME_PREFIX_LEN];
    match read_full(reader, &mut len_bytes).await {
        Ok(()) => {}
        Err(ReadShort::Eof(0)) => {
            return Err(TransportError::ConnectionClosed {
                stage: "reading frame length",
            })
        }
        Err(ReadShort::Eof(received)) => {
            return Err(TransportError::TruncatedFrame {
                expected: FRAME_PREFIX_LEN,
                received,
            })
        }
        Err(ReadShort::Io(e)) => {
            return Err(TransportError::network_with_source(
                "Failed to read message length",
                e,
            ))
        }
    }

    let message_len = u32::from_be_bytes(len_bytes) as usize;
    if message_len > max_size {
        return Err(TransportError::FrameTooLarge {
            size: message_len,
            max: max_size,
        });
    }

    buf.clear();
    buf.resize(message_len, 0);
    match read_full(reader, &mut buf[..]).await {
        Ok(()) => {}
        Err(ReadShort::Eof(received)) => {
            buf.clear();
            return Err(TransportError::TruncatedFrame {
                expected: message_len,
                received,
            });
        }
        Err(ReadShort::Io(e)) => {
            buf.clear();
            return Err(TransportError::network_with_source(
                "Failed to read message data",
                e,
            ));
        }
    }

    debug!(bytes = message_len, "Received frame");
    Ok(&buf[..])
}

/// Write one frame: length prefix followed by `payload`
///
/// On error the stream must be treated as unusable; a partially written
/// frame is never repaired.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max_size: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max_size {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: max_size,
        });
    }

    let prefix = (payload.len() as u32).to_be_bytes();
    let mut frame = Buf::chain(&prefix[..], payload);
    writer
        .write_all_buf(&mut frame)
        .await
        .map_err(|e| TransportError::network_with_source("Failed to write message", e))?;

    // Flush to ensure immediate transmission
    writer
        .flush()
        .await
        .map_err(|e| TransportError::network_with_source("Failed to flush stream", e))?;

    debug!(bytes = payload.len(), "Sent frame");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frame_round_trip_various_sizes() {
        let (mut client, mut server) = duplex(64 * 1024);
        let sizes = vec![0, 1, 100, 1024, 65536, 300_000];

        let writer = tokio::spawn({
            let sizes = sizes.clone();
            async move {
                for size in sizes {
                    let data = vec![0xAA; size];
                    write_frame(&mut client, &data, DEFAULT_MAX_FRAME_SIZE)
                        .await
                        .unwrap();
                }
            }
        });

        let mut buf = BytesMut::new();
        for size in sizes {
            let received = read_frame(&mut server, &mut buf, DEFAULT_MAX_FRAME_SIZE)
                .await
                .unwrap();
            assert_eq!(received.len(), size);
            assert!(received.iter().all(|b| *b == 0xAA));
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_prefix_is_big_endian() {
        let (mut client, mut server) = duplex(1024);
        write_frame(&mut client, b"abc", 16).await.unwrap();
        drop(client);

        let mut raw = Vec::new();
        server.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw, vec![0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_oversized_prefix_rejected_without_allocation() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        let mut buf = BytesMut::new();
        let err = read_frame(&mut server, &mut buf, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::FrameTooLarge { size, max: 1024 } if size == u32::MAX as usize
        ));
        assert_eq!(buf.capacity(), 0);
    }

    #[tokio::test]
    async fn test_eof_before_frame() {
        let (client, mut server) = duplex(1024);
        drop(client);

        let mut buf = BytesMut::new();
        let err = read_frame(&mut server, &mut buf, 1024).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed { .. }));
    }

    #[tokio::test]
    async fn test_eof_mid_prefix() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&[0, 0]).await.unwrap();
        drop(client);

        let mut buf = BytesMut::new();
        let err = read_frame(&mut server, &mut buf, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::TruncatedFrame {
                expected: 4,
                received: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_body() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"12345").await.unwrap();
        drop(client);

        let mut buf = BytesMut::new();
        let err = read_frame(&mut server, &mut buf, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::TruncatedFrame {
                expected: 10,
                received: 5
            }
        ));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_write_through_boxed_writer() {
        let (client, mut server) = duplex(1024);
        let mut writer: Box<dyn AsyncWrite + Unpin + Send> = Box::new(client);
        write_frame(&mut writer, b"boxed", 64).await.unwrap();
        drop(writer);

        let mut buf = BytesMut::new();
        assert_eq!(read_frame(&mut server, &mut buf, 64).await.unwrap(), b"boxed");
    }

    #[tokio::test]
    async fn test_write_rejects_oversized_payload() {
        let (mut client, _server) = duplex(1024);
        let err = write_frame(&mut client, &[0u8; 32], 16).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { size: 32, max: 16 }));
    }

    #[tokio::test]
    async fn test_buffer_reuse_shrinks_logical_length() {
        let (mut client, mut server) = duplex(1024);
        write_frame(&mut client, b"a longer first payload", 64).await.unwrap();
        write_frame(&mut client, b"short", 64).await.unwrap();

        let mut buf = BytesMut::new();
        let first = read_frame(&mut server, &mut buf, 64).await.unwrap().to_vec();
        let second = read_frame(&mut server, &mut buf, 64).await.unwrap();
        assert_eq!(first, b"a longer first payload");
        assert_eq!(second, b"short");
    }
}
