//! Shared fixtures: a server on an ephemeral port with a throwaway PKI

#![allow(dead_code)]

use network::testing::TestPki;
use network::TlsVersion;
use registry_service::{RegistryClient, Server, ServerSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use store::Store;
use tokio::task::JoinHandle;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestServer {
    pub server: Arc<Server>,
    pub addr: SocketAddr,
    pub pki: TestPki,
    pub task: JoinHandle<registry_service::Result<()>>,
}

impl TestServer {
    pub async fn start(store: Arc<dyn Store>) -> Self {
        Self::start_with(store, ServerSettings::default()).await
    }

    pub async fn start_with(store: Arc<dyn Store>, mut settings: ServerSettings) -> Self {
        init_tracing();
        settings.listen_address = "127.0.0.1:0".to_string();

        let pki = TestPki::generate();
        let server = Arc::new(Server::new(
            settings,
            pki.server_tls_config(TlsVersion::Tls12),
            store,
        ));
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        });
        let addr = tokio::time::timeout(Duration::from_secs(5), server.ready())
            .await
            .expect("server should become ready")
            .expect("server should bind");

        Self {
            server,
            addr,
            pki,
            task,
        }
    }

    pub fn client(&self) -> RegistryClient {
        RegistryClient::new(
            self.addr.to_string(),
            network::testing::TEST_SERVER_NAME,
            self.pki.client_tls_config(TlsVersion::Tls12),
        )
        .with_connect_timeout(Duration::from_secs(5))
    }

    /// Close the server and wait for `run` to return
    pub async fn shutdown(self) -> registry_service::Result<()> {
        self.server.close().await?;
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("run should return after close")
            .expect("server task should not panic")
    }
}
