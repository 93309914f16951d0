//! Protocol-level errors for registry message processing
//!
//! Every decode failure maps onto one of two wire-visible classes:
//! [`ErrorCode::UnknownAction`] when the action byte is not one of the
//! enumerated actions, and [`ErrorCode::MalformedMessage`] for everything
//! else. Variants keep enough context (offsets, sizes, tags) to make a
//! rejected frame debuggable from a single log line.

use crate::record::ErrorCode;
use thiserror::Error;

/// Decode errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is too small to contain the expected structure
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: &'static str,
    },

    /// Schema identifier did not match
    #[error("Invalid magic number: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    /// Wire version is not supported by this build
    #[error("Unsupported wire version {version} (supported: {supported})")]
    UnsupportedVersion { version: u8, supported: u8 },

    /// Message kind byte is not known, or not the kind the caller expected
    #[error("Unexpected message kind {actual} (expected: {expected})")]
    UnexpectedKind { expected: &'static str, actual: u8 },

    /// Reserved flag bits were set
    #[error("Reserved flags set: {flags:#04x}")]
    ReservedFlags { flags: u8 },

    /// Header payload size disagrees with the bytes actually present
    #[error("Payload size mismatch: header declares {declared} bytes, message carries {actual}")]
    PayloadSizeMismatch { declared: usize, actual: usize },

    /// Payload checksum validation failed
    #[error("Checksum mismatch: expected {expected:#010x}, calculated {calculated:#010x} ({payload_size} payload bytes)")]
    ChecksumMismatch {
        expected: u32,
        calculated: u32,
        payload_size: usize,
    },

    /// A field length points past the end of its enclosing buffer
    #[error("Truncated field: tag {tag} at offset {offset} needs {need} bytes, {remaining} remain")]
    TruncatedField {
        tag: u8,
        offset: usize,
        need: usize,
        remaining: usize,
    },

    /// A record list entry length points past the end of the payload
    #[error("Truncated list entry {index}: needs {need} bytes, {remaining} remain")]
    TruncatedEntry {
        index: usize,
        need: usize,
        remaining: usize,
    },

    /// Record list declared more entries than it carries, or carries trailing bytes
    #[error("Record count mismatch: declared {declared}, decoded {decoded}")]
    RecordCountMismatch { declared: usize, decoded: usize },

    /// Field tag is not part of the schema
    #[error("Unknown field tag {tag} at offset {offset}")]
    UnknownField { tag: u8, offset: usize },

    /// The same field appeared twice in one record
    #[error("Duplicate field '{field}'")]
    DuplicateField { field: &'static str },

    /// Required field is absent
    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    /// Text field is not valid UTF-8
    #[error("Field '{field}' is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    /// Error field carries a code outside the enumerated set
    #[error("Unknown error code {code}")]
    UnknownErrorCode { code: u8 },

    /// Action byte does not match one of the enumerated actions
    #[error("Unknown action {action}: valid actions are 0 (list), 1 (create), 2 (read)")]
    UnknownAction { action: u8 },
}

/// Result type for codec operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

impl ProtocolError {
    pub fn message_too_small(need: usize, got: usize, context: &'static str) -> Self {
        Self::MessageTooSmall { need, got, context }
    }

    pub fn truncated_field(tag: u8, offset: usize, need: usize, remaining: usize) -> Self {
        Self::TruncatedField {
            tag,
            offset,
            need,
            remaining,
        }
    }

    /// Wire-visible class of this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProtocolError::UnknownAction { .. } => ErrorCode::UnknownAction,
            _ => ErrorCode::MalformedMessage,
        }
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self.error_code() {
            ErrorCode::UnknownAction => "unknown_action",
            _ => "malformed_message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_action_classification() {
        let err = ProtocolError::UnknownAction { action: 7 };
        assert_eq!(err.error_code(), ErrorCode::UnknownAction);
        assert_eq!(err.category(), "unknown_action");
        assert!(err.to_string().contains("Unknown action 7"));
    }

    #[test]
    fn test_structural_errors_are_malformed() {
        let errors = [
            ProtocolError::message_too_small(16, 3, "header"),
            ProtocolError::InvalidMagic {
                expected: 1,
                actual: 2,
            },
            ProtocolError::truncated_field(1, 20, 50, 4),
            ProtocolError::MissingField { field: "name" },
        ];
        for err in errors {
            assert_eq!(err.error_code(), ErrorCode::MalformedMessage, "{err}");
        }
    }
}
