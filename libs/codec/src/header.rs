//! Message Header
//!
//! Every message starts with the same 16-byte header:
//!
//! ```text
//! ┌───────┬─────────┬──────┬────────┬───────┬──────────────┬──────────┐
//! │ magic │ version │ kind │ action │ flags │ payload_size │ checksum │
//! │  u32  │   u8    │  u8  │   u8   │  u8   │     u32      │   u32    │
//! └───────┴─────────┴──────┴────────┴───────┴──────────────┴──────────┘
//! ```
//!
//! Multi-byte fields are little-endian on the wire. The header is read by
//! copy, so the inbound buffer carries no alignment requirement.

use crate::constants::{HEADER_SIZE, WIRE_MAGIC, WIRE_VERSION};
use crate::error::{ProtocolError, ProtocolResult};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Payload layout selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    Request = 1,
    Record = 2,
    RecordList = 3,
}

impl MessageKind {
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Record => "record",
            MessageKind::RecordList => "record_list",
        }
    }
}

// Field order keeps the struct at exactly 16 bytes with no padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct WireHeader {
    pub magic: u32,
    pub version: u8,
    pub kind: u8,
    pub action: u8,
    pub flags: u8,
    pub payload_size: u32,
    pub checksum: u32,
}

const _: () = assert!(std::mem::size_of::<WireHeader>() == HEADER_SIZE);

impl WireHeader {
    /// Header in wire byte order for a finished payload
    pub fn new(kind: MessageKind, action: u8, payload: &[u8]) -> Self {
        Self {
            magic: WIRE_MAGIC.to_le(),
            version: WIRE_VERSION,
            kind: kind.into(),
            action,
            flags: 0,
            payload_size: (payload.len() as u32).to_le(),
            checksum: crc32fast::hash(payload).to_le(),
        }
    }

    pub fn magic(&self) -> u32 {
        u32::from_le(self.magic)
    }

    pub fn payload_size(&self) -> usize {
        u32::from_le(self.payload_size) as usize
    }

    pub fn checksum(&self) -> u32 {
        u32::from_le(self.checksum)
    }

    /// Parse and validate the header of `message`, returning it with the payload
    ///
    /// Checks magic, version, reserved flags, declared payload size and the
    /// payload checksum. Kind and action are left to the caller.
    pub fn parse(message: &[u8]) -> ProtocolResult<(WireHeader, &[u8])> {
        let header = WireHeader::read_from_prefix(message).ok_or_else(|| {
            ProtocolError::message_too_small(HEADER_SIZE, message.len(), "message header")
        })?;

        if header.magic() != WIRE_MAGIC {
            return Err(ProtocolError::InvalidMagic {
                expected: WIRE_MAGIC,
                actual: header.magic(),
            });
        }
        if header.version != WIRE_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                version: header.version,
                supported: WIRE_VERSION,
            });
        }
        if header.flags != 0 {
            return Err(ProtocolError::ReservedFlags {
                flags: header.flags,
            });
        }

        let payload = &message[HEADER_SIZE..];
        if header.payload_size() != payload.len() {
            return Err(ProtocolError::PayloadSizeMismatch {
                declared: header.payload_size(),
                actual: payload.len(),
            });
        }

        let calculated = crc32fast::hash(payload);
        if calculated != header.checksum() {
            return Err(ProtocolError::ChecksumMismatch {
                expected: header.checksum(),
                calculated,
                payload_size: payload.len(),
            });
        }

        Ok((header, payload))
    }

    /// Message kind, checked against what the caller expects
    pub fn expect_kind(&self, expected: &[MessageKind]) -> ProtocolResult<MessageKind> {
        let unexpected = || ProtocolError::UnexpectedKind {
            expected: expected.first().map(|k| k.name()).unwrap_or("none"),
            actual: self.kind,
        };
        let kind = MessageKind::try_from(self.kind).map_err(|_| unexpected())?;
        if expected.contains(&kind) {
            Ok(kind)
        } else {
            Err(unexpected())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(header: WireHeader, payload: &[u8]) -> Vec<u8> {
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_header_layout_is_little_endian() {
        let header = WireHeader::new(MessageKind::Record, 2, b"abc");
        let bytes = header.as_bytes();
        assert_eq!(&bytes[0..4], b"RGST");
        assert_eq!(bytes[4], WIRE_VERSION);
        assert_eq!(bytes[5], MessageKind::Record as u8);
        assert_eq!(bytes[6], 2);
        assert_eq!(&bytes[8..12], &3u32.to_le_bytes());
    }

    #[test]
    fn test_parse_accepts_unaligned_input() {
        let mut bytes = vec![0xFFu8];
        bytes.extend(message(WireHeader::new(MessageKind::Request, 0, b""), b""));
        let (header, payload) = WireHeader::parse(&bytes[1..]).unwrap();
        assert_eq!(header.kind, MessageKind::Request as u8);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_parse_rejects_short_header() {
        let err = WireHeader::parse(&[0u8; 7]).unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooSmall { need: 16, got: 7, .. }));
    }

    #[test]
    fn test_parse_rejects_checksum_mismatch() {
        let mut bytes = message(WireHeader::new(MessageKind::Record, 0, b"abcd"), b"abcd");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let err = WireHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_parse_rejects_size_mismatch() {
        let bytes = message(WireHeader::new(MessageKind::Record, 0, b"abcd"), b"ab");
        let err = WireHeader::parse(&bytes).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::PayloadSizeMismatch {
                declared: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn test_expect_kind() {
        let header = WireHeader::new(MessageKind::RecordList, 0, b"");
        assert_eq!(
            header.expect_kind(&[MessageKind::Record, MessageKind::RecordList]),
            Ok(MessageKind::RecordList)
        );
        assert!(header.expect_kind(&[MessageKind::Request]).is_err());
    }
}
