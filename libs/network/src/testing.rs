//! Throwaway PKI for tests
//!
//! Generates a CA plus server and client leaves signed by it, all valid for
//! `localhost` and `127.0.0.1`. Every call produces fresh keys, so two
//! `TestPki` values never trust each other.

use crate::security::{TlsConfig, TlsVersion};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};

/// Host name every generated leaf is valid for
pub const TEST_SERVER_NAME: &str = "localhost";

struct Leaf {
    cert_pem: String,
    key_pem: String,
}

pub struct TestPki {
    ca_cert: Certificate,
    server: Leaf,
    client: Leaf,
}

impl TestPki {
    /// # Panics
    ///
    /// Panics if key generation or signing fails (test-only).
    pub fn generate() -> Self {
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, "Registry Test CA");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let ca_key = KeyPair::generate().expect("CA key generation should succeed");
        let ca_cert = params
            .self_signed(&ca_key)
            .expect("CA self-signing should succeed");

        let server = issue_leaf(&ca_cert, &ca_key, "registry-server");
        let client = issue_leaf(&ca_cert, &ca_key, "registry-client");

        Self {
            ca_cert,
            server,
            client,
        }
    }

    pub fn ca_pem(&self) -> Vec<u8> {
        self.ca_cert.pem().into_bytes()
    }

    pub fn server_cert_pem(&self) -> Vec<u8> {
        self.server.cert_pem.clone().into_bytes()
    }

    pub fn server_key_pem(&self) -> Vec<u8> {
        self.server.key_pem.clone().into_bytes()
    }

    pub fn client_cert_pem(&self) -> Vec<u8> {
        self.client.cert_pem.clone().into_bytes()
    }

    pub fn client_key_pem(&self) -> Vec<u8> {
        self.client.key_pem.clone().into_bytes()
    }

    /// # Panics
    ///
    /// Panics if the generated material is rejected (test-only).
    pub fn server_tls_config(&self, min_version: TlsVersion) -> TlsConfig {
        TlsConfig::builder()
            .ca_cert_pem(self.ca_pem())
            .cert_pem(self.server_cert_pem())
            .key_pem(self.server_key_pem())
            .min_version(min_version)
            .build()
            .expect("server TLS config should build")
    }

    /// # Panics
    ///
    /// Panics if the generated material is rejected (test-only).
    pub fn client_tls_config(&self, min_version: TlsVersion) -> TlsConfig {
        TlsConfig::builder()
            .ca_cert_pem(self.ca_pem())
            .cert_pem(self.client_cert_pem())
            .key_pem(self.client_key_pem())
            .min_version(min_version)
            .build()
            .expect("client TLS config should build")
    }

    /// Client that trusts this CA but presents `other`'s client identity
    ///
    /// # Panics
    ///
    /// Panics if the generated material is rejected (test-only).
    pub fn foreign_client_tls_config(&self, other: &TestPki) -> TlsConfig {
        TlsConfig::builder()
            .ca_cert_pem(self.ca_pem())
            .cert_pem(other.client_cert_pem())
            .key_pem(other.client_key_pem())
            .build()
            .expect("foreign client TLS config should build")
    }
}

fn issue_leaf(ca_cert: &Certificate, ca_key: &KeyPair, common_name: &str) -> Leaf {
    let mut params = CertificateParams::new(vec![
        TEST_SERVER_NAME.to_string(),
        "127.0.0.1".to_string(),
    ])
    .expect("subject alt names should be valid");
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];

    let key = KeyPair::generate().expect("leaf key generation should succeed");
    let cert = params
        .signed_by(&key, ca_cert, ca_key)
        .expect("leaf signing should succeed");

    Leaf {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    }
}
