//! # Message Builder - Reusable Outbound Encoder
//!
//! `MessageBuilder` owns one growable buffer and encodes a complete message
//! (header + payload) into it. The encoded bytes borrow the builder, so a
//! message cannot outlive the next encode or the builder's return to a pool.
//!
//! ```text
//! Request/Record → [MessageBuilder] → &[u8] message → Framed Transport
//!                        ↑
//!                 reused buffer, header patched in place
//! ```
//!
//! Encoding is total: every `Record` and `Request` produces a message.

use crate::constants::{tags, HEADER_SIZE, LIST_COUNT_SIZE, LIST_ENTRY_PREFIX_SIZE};
use crate::header::{MessageKind, WireHeader};
use crate::record::{Action, Record, Request};
use bytes::{BufMut, BytesMut};
use zerocopy::AsBytes;

/// Default capacity for a fresh builder
pub const DEFAULT_BUILDER_CAPACITY: usize = 1024;

/// Reusable outbound message encoder
#[derive(Debug)]
pub struct MessageBuilder {
    buf: BytesMut,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUILDER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Discard any encoded bytes
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Length of the last encoded message
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Encode a client request
    pub fn encode_request(&mut self, request: &Request) -> &[u8] {
        self.begin();
        if request.action != Action::List || !request.target_name.is_empty() {
            put_field(&mut self.buf, tags::NAME, request.target_name.as_bytes());
        }
        self.finish(MessageKind::Request, request.action.into())
    }

    /// Encode a single record answering `action`
    pub fn encode_record(&mut self, action: Action, record: &Record) -> &[u8] {
        self.begin();
        put_record_fields(&mut self.buf, record);
        self.finish(MessageKind::Record, action.into())
    }

    /// Encode a batch of records as one list message
    pub fn encode_record_list(&mut self, records: &[Record]) -> &[u8] {
        self.begin();
        self.buf.reserve(LIST_COUNT_SIZE);
        self.buf.put_u32_le(records.len() as u32);
        for record in records {
            let entry_start = self.buf.len();
            self.buf.put_u32_le(0);
            put_record_fields(&mut self.buf, record);
            let entry_len = (self.buf.len() - entry_start - LIST_ENTRY_PREFIX_SIZE) as u32;
            self.buf[entry_start..entry_start + LIST_ENTRY_PREFIX_SIZE]
                .copy_from_slice(&entry_len.to_le_bytes());
        }
        self.finish(MessageKind::RecordList, Action::List.into())
    }

    /// Encoded message as an owned vector
    pub fn to_vec(&self) -> Vec<u8> {
        self.buf.to_vec()
    }

    fn begin(&mut self) {
        self.buf.clear();
        self.buf.put_bytes(0, HEADER_SIZE);
    }

    fn finish(&mut self, kind: MessageKind, action: u8) -> &[u8] {
        let header = WireHeader::new(kind, action, &self.buf[HEADER_SIZE..]);
        self.buf[..HEADER_SIZE].copy_from_slice(header.as_bytes());
        &self.buf[..]
    }
}

fn put_field(buf: &mut BytesMut, tag: u8, value: &[u8]) {
    buf.put_u8(tag);
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(value);
}

fn put_record_fields(buf: &mut BytesMut, record: &Record) {
    put_field(buf, tags::NAME, record.name.as_bytes());
    if let Some(id) = &record.id {
        put_field(buf, tags::ID, id.as_bytes());
    }
    if let Some(error) = &record.error {
        buf.put_u8(tags::ERROR);
        buf.put_u32_le((error.message.len() + 1) as u32);
        buf.put_u8(error.code.into());
        buf.put_slice(error.message.as_bytes());
    }
}

/// Encode a request into a fresh buffer
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut builder = MessageBuilder::new();
    builder.encode_request(request);
    builder.to_vec()
}

/// Encode a single record into a fresh buffer
pub fn encode_record(action: Action, record: &Record) -> Vec<u8> {
    let mut builder = MessageBuilder::new();
    builder.encode_record(action, record);
    builder.to_vec()
}

/// Encode a record batch into a fresh buffer
pub fn encode_record_list(records: &[Record]) -> Vec<u8> {
    let mut builder = MessageBuilder::new();
    builder.encode_record_list(records);
    builder.to_vec()
}
