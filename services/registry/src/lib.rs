//! # Registry Service
//!
//! A mutual TLS record registry. Authenticated clients send one framed
//! request per connection (`list`, `create` or `read`) and receive one
//! framed response: a record, a batch of records, or a record carrying an
//! error. Names are validated and kept unique by the [`store::Store`].
//!
//! ## Components
//!
//! - [`Server`]: owns listener, buffer pools and store; spawns a
//!   [`ConnectionHandler`] task per accepted connection
//! - [`ConnectionHandler`]: the per-connection read/decode/dispatch/write
//!   state machine
//! - [`RegistryClient`]: the matching client

pub mod client;
pub mod error;
pub mod handler;
pub mod server;

pub use client::RegistryClient;
pub use error::{Result, ServiceError};
pub use handler::{ConnectionHandler, ConnectionOutcome, ConnectionState, HandlerLimits};
pub use server::{Server, ServerSettings};

use network::{TlsConfig, TlsVersion};
use service_config::{TlsMinVersion, TlsPaths};

/// Load the mutual TLS identity named by `paths`
pub fn load_tls(paths: &TlsPaths) -> Result<TlsConfig> {
    let min_version = match paths.min_version {
        TlsMinVersion::Tls12 => TlsVersion::Tls12,
        TlsMinVersion::Tls13 => TlsVersion::Tls13,
    };
    Ok(TlsConfig::from_files(
        &paths.ca_path,
        &paths.cert_path,
        &paths.key_path,
        min_version,
    )?)
}
