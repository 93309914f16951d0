//! Client side of a mutual TLS connection

use crate::security::{server_name, TlsConfig};
use crate::{Result, TransportError};
use std::time::Duration;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

/// Client side of an authenticated connection
pub type ClientStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Connect to `addr` and complete the TLS handshake, verifying the server
/// as `host` and presenting the client certificate from `tls`
pub async fn connect_tls(
    addr: impl ToSocketAddrs,
    tls: &TlsConfig,
    host: &str,
    connect_timeout: Duration,
) -> Result<ClientStream> {
    let name = server_name(host)?;
    let connector = tls.connector();

    let connect = async {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::network_with_source("Failed to connect", e))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }
        connector
            .connect(name, stream)
            .await
            .map_err(|e| TransportError::security_with_source("TLS handshake failed", e))
    };

    let stream = tokio::time::timeout(connect_timeout, connect)
        .await
        .map_err(|_| TransportError::timeout("connect", connect_timeout.as_millis() as u64))??;

    debug!(host, "TLS connection established");
    Ok(stream)
}
