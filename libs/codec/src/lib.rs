//! # Registry Wire Codec
//!
//! ## Purpose
//!
//! Encoding and decoding rules for the registry protocol:
//! - Typed [`Request`], [`Record`] and [`Response`] messages
//! - A fixed 16-byte [`WireHeader`] carrying schema id, kind, action and a
//!   CRC32 of the payload
//! - [`MessageBuilder`], a reusable outbound encoder
//! - Bounds-checked parsing with [`ProtocolError`] diagnostics
//!
//! ## Architecture Role
//!
//! ```text
//!  store/         [codec]              network/
//!    ↑              ↓                     ↓
//! Records     encode/decode          length-prefixed
//!             Request/Response        frames, TLS
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Framing (the length prefix belongs to `network`)
//! - Name validation rules (owned by the store)
//! - Socket management or connection handling
//!
//! List responses are always a single batch message; clients never rely on
//! stream closure to detect the end of a list.

pub mod builder;
pub mod constants;
pub mod error;
pub mod header;
pub mod parser;
pub mod record;

pub use builder::{encode_record, encode_record_list, encode_request, MessageBuilder};
pub use constants::{HEADER_SIZE, WIRE_MAGIC, WIRE_VERSION};
pub use error::{ProtocolError, ProtocolResult};
pub use header::{MessageKind, WireHeader};
pub use parser::{decode_request, decode_response};
pub use record::{Action, ErrorCode, Record, RecordError, Request, Response};
