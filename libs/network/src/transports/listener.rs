//! Mutual TLS Listener
//!
//! Binds a TCP socket and performs TLS handshakes inside the listener, so
//! [`SecureListener::accept`] only ever yields peers that presented a
//! certificate chaining to the configured CA. Handshakes run concurrently
//! in their own tasks, each bounded by a timeout; a slow or hostile peer
//! cannot stall the accept path for others.

use crate::security::TlsConfig;
use crate::{Result, TransportError};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Server side of an authenticated connection
pub type SecureStream = tokio_rustls::server::TlsStream<TcpStream>;

/// Default bound on a single TLS handshake (10s)
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshaked connections waiting for `accept`
const ACCEPT_BACKLOG: usize = 128;

/// Pause after a failed TCP accept (e.g. descriptor exhaustion)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

pub struct SecureListener {
    local_addr: SocketAddr,
    incoming: tokio::sync::Mutex<mpsc::Receiver<(SecureStream, SocketAddr)>>,
    shutdown: watch::Sender<bool>,
    acceptor_task: Mutex<Option<JoinHandle<()>>>,
}

impl SecureListener {
    /// Bind `addr` and start accepting handshakes in the background
    pub async fn bind(
        addr: impl ToSocketAddrs,
        tls: &TlsConfig,
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::network_with_source("Failed to bind TCP listener", e))?;
        let local_addr = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(accept_loop(
            listener,
            tls.acceptor(),
            tx,
            shutdown_rx,
            handshake_timeout,
        ));

        info!(address = %local_addr, min_tls = %tls.min_version(), "Secure listener bound");

        Ok(Self {
            local_addr,
            incoming: tokio::sync::Mutex::new(rx),
            shutdown,
            acceptor_task: Mutex::new(Some(task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next fully handshaked connection
    ///
    /// Fails with [`TransportError::ListenerClosed`] once [`close`](Self::close)
    /// has been called, including for callers already waiting.
    pub async fn accept(&self) -> Result<(SecureStream, SocketAddr)> {
        let mut shutdown = self.shutdown.subscribe();
        let mut incoming = self.incoming.lock().await;

        tokio::select! {
            biased;
            _ = shutdown.wait_for(|closed| *closed) => Err(TransportError::ListenerClosed),
            next = incoming.recv() => next.ok_or(TransportError::ListenerClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop accepting; the socket is released before this returns
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let task = self.acceptor_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            info!(address = %self.local_addr, "Secure listener closed");
        }
    }
}

impl Drop for SecureListener {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.acceptor_task.get_mut().take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    ready: mpsc::Sender<(SecureStream, SocketAddr)>,
    mut shutdown: watch::Receiver<bool>,
    handshake_timeout: Duration,
) {
    let mut handshakes = JoinSet::new();

    loop {
        let mut backoff = false;
        tokio::select! {
            _ = shutdown.wait_for(|closed| *closed) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    handshakes.spawn(handshake(
                        acceptor.clone(),
                        stream,
                        peer,
                        handshake_timeout,
                        ready.clone(),
                    ));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept TCP connection");
                    backoff = true;
                }
            },
            Some(_) = handshakes.join_next(), if !handshakes.is_empty() => {}
        }

        // Sleep outside select! so no watch::Ref is held across the await
        if backoff {
            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
        }
    }

    handshakes.abort_all();
    debug!("Accept loop stopped");
}

async fn handshake(
    acceptor: TlsAcceptor,
    stream: TcpStream,
    peer: SocketAddr,
    handshake_timeout: Duration,
    ready: mpsc::Sender<(SecureStream, SocketAddr)>,
) {
    match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => {
            debug!(peer = %peer, "TLS handshake complete");
            if ready.send((tls, peer)).await.is_err() {
                debug!(peer = %peer, "Listener closed before connection was accepted");
            }
        }
        Ok(Err(e)) => {
            warn!(peer = %peer, error = %e, "TLS handshake failed");
        }
        Err(_) => {
            warn!(
                peer = %peer,
                timeout_ms = handshake_timeout.as_millis() as u64,
                "TLS handshake timed out"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{client_config_without_cert, TlsVersion};
    use crate::testing::TestPki;
    use crate::transports::connector::connect_tls;
    use crate::transports::framed::{read_frame, write_frame};
    use bytes::BytesMut;
    use std::sync::Arc;
    use tokio_rustls::TlsConnector;

    async fn bound(pki: &TestPki) -> SecureListener {
        let tls = pki.server_tls_config(TlsVersion::Tls12);
        SecureListener::bind("127.0.0.1:0", &tls, Duration::from_secs(5))
            .await
            .unwrap()
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_accept_loop_future_is_send() {
        let pki = TestPki::generate();
        let tls = pki.server_tls_config(TlsVersion::Tls12);
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (ready, _incoming) = mpsc::channel(1);
        let (_shutdown, shutdown_rx) = watch::channel(false);

        let accepting = accept_loop(
            tcp,
            tls.acceptor(),
            ready,
            shutdown_rx,
            Duration::from_secs(1),
        );
        assert_send(&accepting);
    }

    #[tokio::test]
    async fn test_accepts_trusted_client() {
        let pki = TestPki::generate();
        let listener = bound(&pki).await;
        let addr = listener.local_addr();
        let client_tls = pki.client_tls_config(TlsVersion::Tls12);

        let client = tokio::spawn(async move {
            let mut stream = connect_tls(addr, &client_tls, "localhost", Duration::from_secs(5))
                .await
                .unwrap();
            write_frame(&mut stream, b"hello", 1024).await.unwrap();
            let mut buf = BytesMut::new();
            read_frame(&mut stream, &mut buf, 1024).await.unwrap().to_vec()
        });

        let (mut stream, peer) = listener.accept().await.unwrap();
        assert!(peer.ip().is_loopback());
        let mut buf = BytesMut::new();
        let received = read_frame(&mut stream, &mut buf, 1024).await.unwrap().to_vec();
        write_frame(&mut stream, &received, 1024).await.unwrap();

        assert_eq!(client.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_client_without_certificate_never_accepted() {
        let pki = TestPki::generate();
        let listener = bound(&pki).await;
        let addr = listener.local_addr();

        let config = client_config_without_cert(&pki.ca_pem()).unwrap();
        let connector = TlsConnector::from(config);
        let tcp = TcpStream::connect(addr).await.unwrap();
        let name = crate::security::server_name("localhost").unwrap();
        // Under TLS 1.3 the client may finish before the server rejects it
        if let Ok(mut stream) = connector.connect(name, tcp).await {
            let _ = write_frame(&mut stream, b"hello", 1024).await;
            let mut buf = BytesMut::new();
            assert!(read_frame(&mut stream, &mut buf, 1024).await.is_err());
        }

        let accepted =
            tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
        assert!(accepted.is_err(), "unauthenticated peer must not be accepted");
    }

    #[tokio::test]
    async fn test_untrusted_client_certificate_rejected() {
        let pki = TestPki::generate();
        let stranger = TestPki::generate();
        let listener = bound(&pki).await;
        let addr = listener.local_addr();

        let client_tls = pki.foreign_client_tls_config(&stranger);
        if let Ok(mut stream) =
            connect_tls(addr, &client_tls, "localhost", Duration::from_secs(5)).await
        {
            let _ = write_frame(&mut stream, b"hello", 1024).await;
            let mut buf = BytesMut::new();
            assert!(read_frame(&mut stream, &mut buf, 1024).await.is_err());
        }

        let accepted =
            tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
        assert!(accepted.is_err());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_accept_and_releases_socket() {
        let pki = TestPki::generate();
        let listener = Arc::new(bound(&pki).await);
        let addr = listener.local_addr();

        let waiter = tokio::spawn({
            let listener = listener.clone();
            async move { listener.accept().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        listener.close().await;
        assert!(listener.is_closed());
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(TransportError::ListenerClosed)));
        assert!(matches!(
            listener.accept().await,
            Err(TransportError::ListenerClosed)
        ));
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out_handshake() {
        let pki = TestPki::generate();
        let tls = pki.server_tls_config(TlsVersion::Tls12);
        let listener = SecureListener::bind("127.0.0.1:0", &tls, Duration::from_millis(100))
            .await
            .unwrap();

        let mut silent = TcpStream::connect(listener.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Server gave up on the handshake and dropped the socket
        let mut byte = [0u8; 1];
        let read = tokio::io::AsyncReadExt::read(&mut silent, &mut byte).await;
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
