//! # Registry Service Configuration
//!
//! Layered configuration for the registry server and its client:
//! built-in defaults, then an optional TOML file, then `REGISTRY__*`
//! environment variables. Command-line flags are applied last by the
//! binary.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use service_config::ServiceConfig;
//!
//! let config = ServiceConfig::load(Some(std::path::Path::new("registry.toml")))?;
//! println!("listening on {}", config.listen_address);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod service_config;

// Re-export commonly used types
pub use service_config::{
    ClientConfig, DatabaseConfig, LimitsConfig, LoggingConfig, ServiceConfig, TlsMinVersion,
    TlsPaths, DEFAULT_LISTEN_ADDRESS, ENV_PREFIX,
};
