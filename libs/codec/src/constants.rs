//! Wire constants shared by the encoder and the parser.

/// Schema identifier at the start of every message ("RGST" on the wire).
pub const WIRE_MAGIC: u32 = 0x5453_4752;

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Size of the fixed message header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Size of a field prefix: one tag byte plus a little-endian `u32` length.
pub const FIELD_PREFIX_SIZE: usize = 5;

/// Size of the record count that opens a record list payload.
pub const LIST_COUNT_SIZE: usize = 4;

/// Size of the per-entry length prefix inside a record list.
pub const LIST_ENTRY_PREFIX_SIZE: usize = 4;

/// Field tags used inside message payloads.
pub mod tags {
    pub const NAME: u8 = 1;
    pub const ID: u8 = 2;
    pub const ERROR: u8 = 3;
}
