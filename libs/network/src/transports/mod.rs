//! Transport Layer
//!
//! Length-prefixed framing over any async stream, the mutual TLS listener
//! and connector that produce those streams, and the buffer pools that
//! connection handlers borrow from.

pub mod connector;
pub mod framed;
pub mod listener;
pub mod pool;

pub use connector::{connect_tls, ClientStream};
pub use framed::{read_frame, write_frame, DEFAULT_MAX_FRAME_SIZE, FRAME_PREFIX_LEN};
pub use listener::{SecureListener, SecureStream, DEFAULT_HANDSHAKE_TIMEOUT};
pub use pool::{BufferPools, ObjectPool, PoolStats, Pooled, Reusable, MAX_RETAINED_CAPACITY};
