//! # Message Parser
//!
//! Decodes inbound messages with full bounds checking. Every length read
//! from the wire is validated against the bytes that remain before it is
//! used as an offset, so a hostile frame can only ever produce a
//! [`ProtocolError`], never a panic or an out-of-bounds read.

use crate::constants::{tags, FIELD_PREFIX_SIZE, LIST_COUNT_SIZE, LIST_ENTRY_PREFIX_SIZE};
use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{MessageKind, WireHeader};
use crate::record::{Action, ErrorCode, Record, RecordError, Request, Response};

/// One `[tag][len][value]` field borrowed from a payload
struct Field<'a> {
    tag: u8,
    offset: usize,
    value: &'a [u8],
}

/// Iterator over the fields of a record or request payload
struct Fields<'a> {
    data: &'a [u8],
    pos: usize,
    /// Offset of `data` within the whole payload, for diagnostics
    base: usize,
}

impl<'a> Fields<'a> {
    fn new(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = ProtocolResult<Field<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.data.len() - self.pos;
        if remaining == 0 {
            return None;
        }
        let offset = self.base + self.pos;
        let tag = self.data[self.pos];
        if remaining < FIELD_PREFIX_SIZE {
            self.pos = self.data.len();
            return Some(Err(ProtocolError::truncated_field(
                tag,
                offset,
                FIELD_PREFIX_SIZE,
                remaining,
            )));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.data[self.pos + 1..self.pos + FIELD_PREFIX_SIZE]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let available = remaining - FIELD_PREFIX_SIZE;
        if len > available {
            self.pos = self.data.len();
            return Some(Err(ProtocolError::truncated_field(
                tag, offset, len, available,
            )));
        }

        let start = self.pos + FIELD_PREFIX_SIZE;
        self.pos = start + len;
        Some(Ok(Field {
            tag,
            offset,
            value: &self.data[start..start + len],
        }))
    }
}

fn utf8(value: &[u8], field: &'static str) -> ProtocolResult<String> {
    std::str::from_utf8(value)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8 { field })
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> ProtocolResult<()> {
    if slot.is_some() {
        return Err(ProtocolError::DuplicateField { field });
    }
    *slot = Some(value);
    Ok(())
}

fn decode_record_fields(data: &[u8], base: usize) -> ProtocolResult<Record> {
    let mut name = None;
    let mut id = None;
    let mut error = None;

    for field in Fields::new(data, base) {
        let field = field?;
        match field.tag {
            tags::NAME => set_once(&mut name, utf8(field.value, "name")?, "name")?,
            tags::ID => set_once(&mut id, utf8(field.value, "id")?, "id")?,
            tags::ERROR => {
                let (&code, message) = field.value.split_first().ok_or(
                    ProtocolError::truncated_field(tags::ERROR, field.offset, 1, 0),
                )?;
                let code = ErrorCode::try_from(code)
                    .map_err(|_| ProtocolError::UnknownErrorCode { code })?;
                let record_error = RecordError {
                    code,
                    message: utf8(message, "error")?,
                };
                set_once(&mut error, record_error, "error")?;
            }
            tag => {
                return Err(ProtocolError::UnknownField {
                    tag,
                    offset: field.offset,
                })
            }
        }
    }

    Ok(Record {
        id,
        name: name.ok_or(ProtocolError::MissingField { field: "name" })?,
        error,
    })
}

fn decode_record_list(payload: &[u8]) -> ProtocolResult<Vec<Record>> {
    if payload.len() < LIST_COUNT_SIZE {
        return Err(ProtocolError::message_too_small(
            LIST_COUNT_SIZE,
            payload.len(),
            "record list count",
        ));
    }
    let mut count_bytes = [0u8; 4];
    count_bytes.copy_from_slice(&payload[..LIST_COUNT_SIZE]);
    let declared = u32::from_le_bytes(count_bytes) as usize;

    // Each entry needs at least its length prefix, which bounds the allocation.
    let max_entries = (payload.len() - LIST_COUNT_SIZE) / LIST_ENTRY_PREFIX_SIZE;
    let mut records = Vec::with_capacity(declared.min(max_entries));
    let mut pos = LIST_COUNT_SIZE;

    while pos < payload.len() {
        let index = records.len();
        let remaining = payload.len() - pos;
        if remaining < LIST_ENTRY_PREFIX_SIZE {
            return Err(ProtocolError::TruncatedEntry {
                index,
                need: LIST_ENTRY_PREFIX_SIZE,
                remaining,
            });
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&payload[pos..pos + LIST_ENTRY_PREFIX_SIZE]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let start = pos + LIST_ENTRY_PREFIX_SIZE;
        if len > payload.len() - start {
            return Err(ProtocolError::TruncatedEntry {
                index,
                need: len,
                remaining: payload.len() - start,
            });
        }
        records.push(decode_record_fields(&payload[start..start + len], start)?);
        pos = start + len;
    }

    if records.len() != declared {
        return Err(ProtocolError::RecordCountMismatch {
            declared,
            decoded: records.len(),
        });
    }
    Ok(records)
}

fn decode_action(byte: u8) -> ProtocolResult<Action> {
    Action::try_from(byte).map_err(|_| ProtocolError::UnknownAction { action: byte })
}

/// Decode a client request
///
/// Structural problems are reported before the action is interpreted, so an
/// `UnknownAction` error always refers to an otherwise well-formed message.
pub fn decode_request(message: &[u8]) -> ProtocolResult<Request> {
    let (header, payload) = WireHeader::parse(message)?;
    header.expect_kind(&[MessageKind::Request])?;

    let mut name = None;
    for field in Fields::new(payload, 0) {
        let field = field?;
        match field.tag {
            tags::NAME => set_once(&mut name, utf8(field.value, "name")?, "name")?,
            tag => {
                return Err(ProtocolError::UnknownField {
                    tag,
                    offset: field.offset,
                })
            }
        }
    }

    let action = decode_action(header.action)?;
    let target_name = match action {
        Action::List => String::new(),
        Action::Create | Action::Read => {
            name.ok_or(ProtocolError::MissingField { field: "name" })?
        }
    };

    Ok(Request {
        action,
        target_name,
    })
}

/// Decode a server response, either a single record or a batch
pub fn decode_response(message: &[u8]) -> ProtocolResult<Response> {
    let (header, payload) = WireHeader::parse(message)?;
    match header.expect_kind(&[MessageKind::Record, MessageKind::RecordList])? {
        MessageKind::RecordList => Ok(Response::Records(decode_record_list(payload)?)),
        _ => Ok(Response::Record {
            action: decode_action(header.action)?,
            record: decode_record_fields(payload, 0)?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{encode_record, encode_record_list, encode_request};
    use crate::constants::HEADER_SIZE;
    use zerocopy::AsBytes;

    /// Wrap a hand-built payload in a valid header
    fn framed(kind: MessageKind, action: u8, payload: &[u8]) -> Vec<u8> {
        let mut bytes = WireHeader::new(kind, action, payload).as_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_decode_create_request() {
        let message = encode_request(&Request::create("testOrg"));
        let request = decode_request(&message).unwrap();
        assert_eq!(request, Request::create("testOrg"));
    }

    #[test]
    fn test_list_request_ignores_name() {
        let mut payload = vec![tags::NAME];
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(b"xyz");
        let request = decode_request(&framed(MessageKind::Request, 0, &payload)).unwrap();
        assert_eq!(request, Request::list());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let mut payload = vec![tags::NAME];
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(b"abc");
        let err = decode_request(&framed(MessageKind::Request, 9, &payload)).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownAction { action: 9 });
    }

    #[test]
    fn test_missing_name_on_read() {
        let err = decode_request(&framed(MessageKind::Request, 2, &[])).unwrap_err();
        assert_eq!(err, ProtocolError::MissingField { field: "name" });
    }

    #[test]
    fn test_field_length_past_end() {
        let mut payload = vec![tags::NAME];
        payload.extend_from_slice(&1000u32.to_le_bytes());
        payload.extend_from_slice(b"abc");
        let err = decode_request(&framed(MessageKind::Request, 1, &payload)).unwrap_err();
        assert_eq!(err, ProtocolError::truncated_field(tags::NAME, 0, 1000, 3));
    }

    #[test]
    fn test_truncated_field_prefix() {
        let payload = [tags::NAME, 0x01];
        let err = decode_request(&framed(MessageKind::Request, 1, &payload)).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedField { need: 5, remaining: 2, .. }));
    }

    #[test]
    fn test_unknown_field_tag() {
        let mut payload = vec![0x7F];
        payload.extend_from_slice(&0u32.to_le_bytes());
        let err = decode_request(&framed(MessageKind::Request, 1, &payload)).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownField { tag: 0x7F, offset: 0 });
    }

    #[test]
    fn test_invalid_utf8_name() {
        let mut payload = vec![tags::NAME];
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(&[0xFF, 0xFE, 0xFD]);
        let err = decode_request(&framed(MessageKind::Request, 1, &payload)).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidUtf8 { field: "name" });
    }

    #[test]
    fn test_response_is_not_a_request() {
        let message = encode_record(Action::Read, &Record::named("testOrg"));
        let err = decode_request(&message).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedKind { .. }));
    }

    #[test]
    fn test_wrong_magic() {
        let mut message = encode_request(&Request::list());
        message[0] = b'X';
        let err = decode_request(&message).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMagic { .. }));
        assert_eq!(err.error_code(), ErrorCode::MalformedMessage);
    }

    #[test]
    fn test_decode_record_response() {
        let record = Record::with_id("b6f1", "testOrg");
        let message = encode_record(Action::Read, &record);
        let response = decode_response(&message).unwrap();
        assert_eq!(
            response,
            Response::Record {
                action: Action::Read,
                record
            }
        );
    }

    #[test]
    fn test_decode_error_record_response() {
        let record = Record::failed("nope", ErrorCode::NotFound, "No record named 'nope'");
        let response = decode_response(&encode_record(Action::Read, &record)).unwrap();
        assert_eq!(response.into_record(), Some(record));
    }

    #[test]
    fn test_decode_empty_list() {
        let response = decode_response(&encode_record_list(&[])).unwrap();
        assert_eq!(response, Response::Records(vec![]));
    }

    #[test]
    fn test_decode_list_preserves_order() {
        let records = vec![Record::named("abc"), Record::named("bcd"), Record::named("cde")];
        let response = decode_response(&encode_record_list(&records)).unwrap();
        assert_eq!(response.into_records(), Some(records));
    }

    #[test]
    fn test_list_count_mismatch() {
        let mut payload = 2u32.to_le_bytes().to_vec();
        let mut entry = vec![tags::NAME];
        entry.extend_from_slice(&3u32.to_le_bytes());
        entry.extend_from_slice(b"abc");
        payload.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        payload.extend_from_slice(&entry);
        let err = decode_response(&framed(MessageKind::RecordList, 0, &payload)).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::RecordCountMismatch {
                declared: 2,
                decoded: 1
            }
        );
    }

    #[test]
    fn test_huge_declared_count_does_not_allocate() {
        let payload = u32::MAX.to_le_bytes();
        let err = decode_response(&framed(MessageKind::RecordList, 0, &payload)).unwrap_err();
        assert!(matches!(err, ProtocolError::RecordCountMismatch { decoded: 0, .. }));
    }

    #[test]
    fn test_truncated_list_entry() {
        let mut payload = 1u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&50u32.to_le_bytes());
        payload.extend_from_slice(&[tags::NAME, 0, 0]);
        let err = decode_response(&framed(MessageKind::RecordList, 0, &payload)).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::TruncatedEntry {
                index: 0,
                need: 50,
                remaining: 3
            }
        );
    }

    #[test]
    fn test_duplicate_name_field() {
        let mut payload = Vec::new();
        for _ in 0..2 {
            payload.push(tags::NAME);
            payload.extend_from_slice(&3u32.to_le_bytes());
            payload.extend_from_slice(b"abc");
        }
        let err = decode_request(&framed(MessageKind::Request, 1, &payload)).unwrap_err();
        assert_eq!(err, ProtocolError::DuplicateField { field: "name" });
    }

    #[test]
    fn test_header_only_truncation() {
        let message = encode_request(&Request::create("testOrg"));
        let err = decode_request(&message[..HEADER_SIZE + 2]).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadSizeMismatch { .. }));
    }
}
