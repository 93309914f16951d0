//! Mutual TLS Configuration
//!
//! One CA bundle anchors both directions: the server presents a chain that
//! clients verify against it, and every client must present a certificate
//! that chains to the same bundle. Client verification is mandatory, so a
//! peer without a trusted certificate never completes the handshake.
//!
//! Only forward-secret AEAD suites are offered, and the minimum protocol
//! version is pinned to TLS 1.2 (or TLS 1.3 when configured).

use crate::{Result, TransportError};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig, SupportedProtocolVersion};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Lowest protocol version a peer may negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TlsVersion {
    #[default]
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

impl TlsVersion {
    fn protocol_versions(self) -> &'static [&'static SupportedProtocolVersion] {
        static TLS12_AND_UP: &[&SupportedProtocolVersion] =
            &[&rustls::version::TLS13, &rustls::version::TLS12];
        static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];
        match self {
            TlsVersion::Tls12 => TLS12_AND_UP,
            TlsVersion::Tls13 => TLS13_ONLY,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsVersion::Tls12 => write!(f, "1.2"),
            TlsVersion::Tls13 => write!(f, "1.3"),
        }
    }
}

/// Crypto provider restricted to forward-secret AEAD suites
pub fn restricted_provider() -> Arc<CryptoProvider> {
    use ring::cipher_suite::*;

    Arc::new(CryptoProvider {
        cipher_suites: vec![
            TLS13_AES_256_GCM_SHA384,
            TLS13_AES_128_GCM_SHA256,
            TLS13_CHACHA20_POLY1305_SHA256,
            TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
            TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ],
        ..ring::default_provider()
    })
}

/// Server and client halves of one mutual TLS identity
#[derive(Clone)]
pub struct TlsConfig {
    server_config: Arc<ServerConfig>,
    client_config: Arc<ClientConfig>,
    min_version: TlsVersion,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("min_version", &self.min_version)
            .finish_non_exhaustive()
    }
}

impl TlsConfig {
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::new()
    }

    /// Load CA bundle, certificate chain and private key from PEM files
    pub fn from_files(
        ca_path: impl AsRef<Path>,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        min_version: TlsVersion,
    ) -> Result<Self> {
        TlsConfigBuilder::new()
            .ca_cert_pem(read_pem_file(ca_path.as_ref(), "CA bundle")?)
            .cert_pem(read_pem_file(cert_path.as_ref(), "certificate")?)
            .key_pem(read_pem_file(key_path.as_ref(), "private key")?)
            .min_version(min_version)
            .build()
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.server_config.clone())
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.client_config.clone())
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        self.server_config.clone()
    }

    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    pub fn min_version(&self) -> TlsVersion {
        self.min_version
    }
}

/// Builder for [`TlsConfig`] from PEM bytes
#[derive(Default)]
pub struct TlsConfigBuilder {
    ca_cert_pem: Option<Vec<u8>>,
    cert_pem: Option<Vec<u8>>,
    key_pem: Option<Vec<u8>>,
    min_version: TlsVersion,
}

impl TlsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ca_cert_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_cert_pem = Some(pem.into());
        self
    }

    pub fn cert_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.cert_pem = Some(pem.into());
        self
    }

    pub fn key_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.key_pem = Some(pem.into());
        self
    }

    pub fn min_version(mut self, version: TlsVersion) -> Self {
        self.min_version = version;
        self
    }

    pub fn build(self) -> Result<TlsConfig> {
        let ca_pem = self.ca_cert_pem.ok_or_else(|| {
            TransportError::configuration("CA certificate required", Some("ca_path"))
        })?;
        let cert_pem = self.cert_pem.ok_or_else(|| {
            TransportError::configuration("certificate required", Some("cert_path"))
        })?;
        let key_pem = self.key_pem.ok_or_else(|| {
            TransportError::configuration("private key required", Some("key_path"))
        })?;

        let roots = Arc::new(root_store(&ca_pem)?);
        let chain = parse_certificates(&cert_pem, "certificate")?;
        let key = parse_private_key(&key_pem)?;

        let provider = restricted_provider();
        let versions = self.min_version.protocol_versions();

        // Client certificates are mandatory: no anonymous fallback
        let verifier = WebPkiClientVerifier::builder_with_provider(roots.clone(), provider.clone())
            .build()
            .map_err(|e| TransportError::security_with_source("client verifier error", e))?;

        let server_config = ServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(versions)
            .map_err(|e| TransportError::security_with_source("unsupported protocol versions", e))?
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain.clone(), key.clone_key())
            .map_err(|e| TransportError::security_with_source("server config error", e))?;

        let client_config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(versions)
            .map_err(|e| TransportError::security_with_source("unsupported protocol versions", e))?
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, key)
            .map_err(|e| TransportError::security_with_source("client config error", e))?;

        Ok(TlsConfig {
            server_config: Arc::new(server_config),
            client_config: Arc::new(client_config),
            min_version: self.min_version,
        })
    }
}

/// Client config that trusts `ca_pem` but presents no certificate
///
/// Only useful for exercising the server's rejection path.
pub fn client_config_without_cert(ca_pem: &[u8]) -> Result<Arc<ClientConfig>> {
    let roots = root_store(ca_pem)?;
    let config = ClientConfig::builder_with_provider(restricted_provider())
        .with_protocol_versions(TlsVersion::Tls12.protocol_versions())
        .map_err(|e| TransportError::security_with_source("unsupported protocol versions", e))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Parse a server name for SNI and certificate verification
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| TransportError::security_with_source(format!("invalid server name {host}"), e))
}

fn root_store(ca_pem: &[u8]) -> Result<RootCertStore> {
    let ca_certs = parse_certificates(ca_pem, "CA")?;
    let mut roots = RootCertStore::empty();
    for cert in ca_certs {
        roots
            .add(cert)
            .map_err(|e| TransportError::security_with_source("failed to add CA certificate", e))?;
    }
    Ok(roots)
}

fn parse_certificates(pem: &[u8], what: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            TransportError::security_with_source(format!("failed to parse {what} PEM"), e)
        })?;
    if certs.is_empty() {
        return Err(TransportError::security(format!(
            "no {what} certificates found"
        )));
    }
    Ok(certs)
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_slice(pem)
        .map_err(|e| TransportError::security_with_source("failed to parse private key", e))
}

fn read_pem_file(path: &Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| TransportError::Io {
        message: format!("failed to read {what} from {}", path.display()),
        source: e,
    })
}
