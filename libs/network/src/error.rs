//! Transport Error Types
//!
//! Error handling for framing, TLS setup and listener lifecycle. Every
//! variant is terminal for the unit of work it occurs in: a connection, or
//! the accept loop for [`TransportError::ListenerClosed`].

use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Peer closed the stream before a frame started
    #[error("Connection closed by peer while {stage}")]
    ConnectionClosed { stage: &'static str },

    /// Peer closed the stream in the middle of a frame
    #[error("Truncated frame: expected {expected} bytes, received {received} before EOF")]
    TruncatedFrame { expected: usize, received: usize },

    /// Length prefix exceeds the configured maximum message size
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Listener was closed; expected during shutdown
    #[error("Listener closed")]
    ListenerClosed,

    /// TLS configuration and handshake errors
    #[error("Security error: {message}")]
    Security {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a security error
    pub fn security(message: impl Into<String>) -> Self {
        Self::Security {
            message: message.into(),
            source: None,
        }
    }

    /// Create a security error with source
    pub fn security_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Security {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn is_listener_closed(&self) -> bool {
        matches!(self, TransportError::ListenerClosed)
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::ConnectionClosed { .. } => "connection_closed",
            TransportError::TruncatedFrame { .. } => "truncated_frame",
            TransportError::FrameTooLarge { .. } => "frame_too_large",
            TransportError::ListenerClosed => "listener_closed",
            TransportError::Security { .. } => "security",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Io { .. } => "io",
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}
