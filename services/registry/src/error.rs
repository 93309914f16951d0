//! # Registry Service Error Types

use codec::ProtocolError;
use network::TransportError;
use store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Socket, framing or TLS failures
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Response bytes did not decode
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// `run` called while another `run` owns the listener
    #[error("Server is already running")]
    AlreadyRunning,

    /// Server answered with a message of the wrong shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;
