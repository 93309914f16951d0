//! Typed messages exchanged over the wire.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action requested by a client
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum Action {
    List = 0,
    Create = 1,
    Read = 2,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::List => "list",
            Action::Create => "create",
            Action::Read => "read",
        };
        f.write_str(name)
    }
}

/// Failure class carried inside a record's error field
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum ErrorCode {
    /// Store rejected the name (length rules, duplicate)
    ValidationFailed = 1,
    /// Read target does not exist
    NotFound = 2,
    /// Request bytes could not be decoded
    MalformedMessage = 3,
    /// Request carried an action outside the enumerated set
    UnknownAction = 4,
    /// Encoded answer would exceed the negotiated frame limit
    ResponseTooLarge = 5,
}

/// A single decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub action: Action,
    /// Name to create or read; empty for [`Action::List`]
    pub target_name: String,
}

impl Request {
    pub fn list() -> Self {
        Self {
            action: Action::List,
            target_name: String::new(),
        }
    }

    pub fn create(name: impl Into<String>) -> Self {
        Self {
            action: Action::Create,
            target_name: name.into(),
        }
    }

    pub fn read(name: impl Into<String>) -> Self {
        Self {
            action: Action::Read,
            target_name: name.into(),
        }
    }
}

/// In-band failure reported to the peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// The entity persisted by the store and transmitted to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<String>,
    pub name: String,
    pub error: Option<RecordError>,
}

impl Record {
    /// Record carrying only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            error: None,
        }
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            error: None,
        }
    }

    /// Failed attempt on `name`
    pub fn failed(name: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            error: Some(RecordError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A decoded server response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Single record answering a create or read, or reporting a failure
    Record { action: Action, record: Record },
    /// Batch answering a list
    Records(Vec<Record>),
}

impl Response {
    /// The single record, if this is not a batch
    pub fn into_record(self) -> Option<Record> {
        match self {
            Response::Record { record, .. } => Some(record),
            Response::Records(_) => None,
        }
    }

    /// The batch, if this is a list response
    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            Response::Records(records) => Some(records),
            Response::Record { .. } => None,
        }
    }
}
