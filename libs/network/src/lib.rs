//! Network Infrastructure
//!
//! Everything between a TCP socket and a decoded message: mutual TLS setup,
//! an accepting listener that only yields authenticated peers, length
//! prefixed framing, and pooled buffers for the request/response path.

pub mod error;
pub mod security;
pub mod transports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{Result, TransportError};
pub use security::{TlsConfig, TlsConfigBuilder, TlsVersion};
pub use transports::{
    connect_tls, read_frame, write_frame, BufferPools, ClientStream, PoolStats, Pooled,
    SecureListener, SecureStream, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_FRAME_SIZE,
    FRAME_PREFIX_LEN,
};

// Constants for configuration
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
