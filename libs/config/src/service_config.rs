//! Service Configuration Module
//!
//! Loads [`ServiceConfig`] from an optional TOML file with environment
//! variable overrides. Every field has a default, so an empty file (or no
//! file at all) yields a runnable configuration apart from the certificate
//! files, which must exist when TLS is set up.

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable prefix; keys are separated by `__`
/// (e.g. `REGISTRY__LIMITS__MAX_MESSAGE_SIZE`)
pub const ENV_PREFIX: &str = "REGISTRY";

const ENV_SEPARATOR: &str = "__";

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:13800";

/// Main service configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// `host:port` the server binds
    pub listen_address: String,

    pub tls: TlsPaths,

    pub database: DatabaseConfig,

    pub limits: LimitsConfig,

    pub logging: LoggingConfig,

    /// Settings for the `list`/`create`/`read` client commands
    pub client: ClientConfig,
}

/// PEM files for the mutual TLS identity
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TlsPaths {
    /// CA bundle; anchors both the presented chain and client verification
    pub ca_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub min_version: TlsMinVersion,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMinVersion {
    #[default]
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

impl fmt::Display for TlsMinVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsMinVersion::Tls12 => write!(f, "1.2"),
            TlsMinVersion::Tls13 => write!(f, "1.3"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; `None` keeps records in memory only
    pub path: Option<PathBuf>,
}

/// Per-connection resource limits
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_message_size: usize,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    /// Concurrent connection cap; `None` admits every connection
    pub max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub server_address: String,
    /// Name the server certificate is verified against
    pub server_name: String,
    pub connect_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            tls: TlsPaths::default(),
            database: DatabaseConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Default for TlsPaths {
    fn default() -> Self {
        Self {
            ca_path: PathBuf::from("./certs/ca.pem"),
            cert_path: PathBuf::from("./certs/cert.pem"),
            key_path: PathBuf::from("./certs/key.pem"),
            min_version: TlsMinVersion::Tls12,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024, // 1MB
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            handshake_timeout_ms: 10_000,
            max_connections: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:13800".to_string(),
            server_name: "localhost".to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl LimitsConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl ServiceConfig {
    /// Load configuration from an optional file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading overrides from `env` instead of
    /// the process environment when given
    pub fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                bail!("Configuration file not found: {}", path.display());
            }
            info!("Loading configuration from {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        // Override with environment variables (REGISTRY__ prefix)
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut service_config: ServiceConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        service_config.expand_paths()?;
        service_config.validate()?;

        debug!(?service_config, "Configuration loaded");
        Ok(service_config)
    }

    /// Expand `~` and `$VAR` references in file paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.tls.ca_path = expand(&self.tls.ca_path).context("Failed to expand CA path")?;
        self.tls.cert_path =
            expand(&self.tls.cert_path).context("Failed to expand certificate path")?;
        self.tls.key_path = expand(&self.tls.key_path).context("Failed to expand key path")?;
        if let Some(db) = &self.database.path {
            self.database.path = Some(expand(db).context("Failed to expand database path")?);
        }
        Ok(())
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.trim().is_empty() {
            bail!("listen_address must not be empty");
        }
        if self.limits.max_message_size == 0 {
            bail!("limits.max_message_size must be greater than zero");
        }
        if self.limits.max_message_size > u32::MAX as usize {
            bail!(
                "limits.max_message_size {} exceeds the frame prefix range",
                self.limits.max_message_size
            );
        }
        for (name, value) in [
            ("limits.read_timeout_ms", self.limits.read_timeout_ms),
            ("limits.write_timeout_ms", self.limits.write_timeout_ms),
            ("limits.handshake_timeout_ms", self.limits.handshake_timeout_ms),
            ("client.connect_timeout_ms", self.client.connect_timeout_ms),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if self.limits.max_connections == Some(0) {
            bail!("limits.max_connections must be greater than zero when set");
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn no_env() -> Option<Map<String, String>> {
        Some(Map::new())
    }

    #[test]
    fn test_defaults_without_file() {
        let config = ServiceConfig::load_with_env(None, no_env()).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.listen_address, "0.0.0.0:13800");
        assert_eq!(config.limits.max_message_size, 1024 * 1024);
        assert_eq!(config.tls.min_version, TlsMinVersion::Tls12);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_load_base_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("registry.toml");

        let config_content = r#"
listen_address = "127.0.0.1:9000"

[tls]
ca_path = "/etc/registry/ca.pem"
cert_path = "/etc/registry/server.pem"
key_path = "/etc/registry/server.key"
min_version = "1.3"

[database]
path = "/var/lib/registry/records.db"

[limits]
max_message_size = 4096
max_connections = 64

[logging]
level = "debug"
json = true
"#;

        fs::write(&config_path, config_content).unwrap();

        let config = ServiceConfig::load_with_env(Some(&config_path), no_env()).unwrap();

        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert_eq!(config.tls.ca_path, PathBuf::from("/etc/registry/ca.pem"));
        assert_eq!(config.tls.min_version, TlsMinVersion::Tls13);
        assert_eq!(
            config.database.path,
            Some(PathBuf::from("/var/lib/registry/records.db"))
        );
        assert_eq!(config.limits.max_message_size, 4096);
        assert_eq!(config.limits.max_connections, Some(64));
        // Unset fields keep their defaults
        assert_eq!(config.limits.read_timeout_ms, 30_000);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_environment_override() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("registry.toml");
        fs::write(&config_path, "listen_address = \"127.0.0.1:9000\"\n").unwrap();

        let mut env = Map::new();
        env.insert(
            "REGISTRY__LISTEN_ADDRESS".to_string(),
            "127.0.0.1:9100".to_string(),
        );
        env.insert(
            "REGISTRY__LIMITS__READ_TIMEOUT_MS".to_string(),
            "250".to_string(),
        );

        let config = ServiceConfig::load_with_env(Some(&config_path), Some(env)).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:9100");
        assert_eq!(config.limits.read_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = ServiceConfig::load_with_env(Some(&dir.path().join("absent.toml")), no_env())
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_rejects_zero_limits() {
        let mut config = ServiceConfig::default();
        config.limits.max_message_size = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.limits.handshake_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.limits.max_connections = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_min_version_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("registry.toml");
        fs::write(&config_path, "[tls]\nmin_version = \"1.0\"\n").unwrap();
        assert!(ServiceConfig::load_with_env(Some(&config_path), no_env()).is_err());
    }

    #[test]
    fn test_toml_rendering_reloads() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("registry.toml");

        let mut config = ServiceConfig::default();
        config.limits.max_connections = Some(8);
        config.database.path = Some(dir.path().join("records.db"));
        fs::write(&config_path, config.to_toml_string().unwrap()).unwrap();

        let reloaded = ServiceConfig::load_with_env(Some(&config_path), no_env()).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_home_expansion() {
        let mut config = ServiceConfig::default();
        config.tls.ca_path = PathBuf::from("~/certs/ca.pem");
        config.expand_paths().unwrap();
        assert!(!config.tls.ca_path.to_string_lossy().starts_with('~'));
    }
}
