//! # Registry Server
//!
//! Owns the listener, the buffer pools and the store handle, and runs the
//! accept loop: one spawned task per authenticated connection. Readiness is
//! published once, after the socket is bound and before the first accept,
//! so callers can connect as soon as [`Server::ready`] resolves.
//!
//! [`Server::close`] closes the admission gate and the listener, which makes
//! a running [`Server::run`] return `Ok(())` even while every connection slot
//! is taken, and then closes the store. In-flight connections are not awaited.

use crate::error::{Result, ServiceError};
use crate::handler::{ConnectionHandler, HandlerLimits};
use network::{BufferPools, PoolStats, SecureListener, TlsConfig};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use store::Store;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{debug, error, info, warn, Instrument};

/// Runtime settings for [`Server`]
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen_address: String,
    pub limits: HandlerLimits,
    pub handshake_timeout: Duration,
    /// Admission cap; `None` spawns a task for every connection
    pub max_connections: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_address: service_config::DEFAULT_LISTEN_ADDRESS.to_string(),
            limits: HandlerLimits::default(),
            handshake_timeout: network::DEFAULT_HANDSHAKE_TIMEOUT,
            max_connections: None,
        }
    }
}

impl From<&service_config::ServiceConfig> for ServerSettings {
    fn from(config: &service_config::ServiceConfig) -> Self {
        Self {
            listen_address: config.listen_address.clone(),
            limits: HandlerLimits::from(&config.limits),
            handshake_timeout: config.limits.handshake_timeout(),
            max_connections: config.limits.max_connections,
        }
    }
}

pub struct Server {
    settings: ServerSettings,
    tls: TlsConfig,
    store: Arc<dyn Store>,
    pools: Arc<BufferPools>,
    listener: Mutex<Option<Arc<SecureListener>>>,
    /// Set by `close`; a later `run` returns immediately
    closed: AtomicBool,
    ready: watch::Sender<Option<SocketAddr>>,
    admission: Option<Arc<Semaphore>>,
}

impl Server {
    pub fn new(settings: ServerSettings, tls: TlsConfig, store: Arc<dyn Store>) -> Self {
        let admission = settings
            .max_connections
            .map(|max| Arc::new(Semaphore::new(max)));
        let (ready, _) = watch::channel(None);
        Self {
            settings,
            tls,
            store,
            pools: Arc::new(BufferPools::new()),
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
            ready,
            admission,
        }
    }

    /// Bind and serve until [`close`](Self::close) is called
    pub async fn run(&self) -> Result<()> {
        // A closed server has already closed its store; ping would fail
        if self.closed.load(Ordering::SeqCst) {
            info!("Server closed before it started listening");
            return Ok(());
        }
        self.store.ping().await?;
        debug!("Store ping succeeded");

        let listener = {
            let mut slot = self.listener.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                info!("Server closed before it started listening");
                return Ok(());
            }
            if slot.is_some() {
                return Err(ServiceError::AlreadyRunning);
            }
            let listener = Arc::new(
                SecureListener::bind(
                    self.settings.listen_address.as_str(),
                    &self.tls,
                    self.settings.handshake_timeout,
                )
                .await?,
            );
            *slot = Some(listener.clone());
            listener
        };

        let address = listener.local_addr();
        info!(address = %address, "🚀 Registry server listening");
        self.ready.send_replace(Some(address));

        let handler = ConnectionHandler::new(
            self.store.clone(),
            self.pools.clone(),
            self.settings.limits,
        );

        loop {
            // Wait for capacity before taking another connection off the listener
            let permit = match &self.admission {
                Some(gate) => match gate.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                None => None,
            };

            match listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = handler.clone();
                    let span = tracing::info_span!("connection", peer = %peer);
                    tokio::spawn(
                        async move {
                            handler.handle(stream, peer).await;
                            drop(permit);
                        }
                        .instrument(span),
                    );
                }
                Err(e) if e.is_listener_closed() => break,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }

        info!(address = %address, "Registry server stopped accepting");
        Ok(())
    }

    /// Resolves with the bound address once `run` is accepting
    pub async fn ready(&self) -> Option<SocketAddr> {
        let mut rx = self.ready.subscribe();
        rx.wait_for(Option::is_some).await.ok().and_then(|addr| *addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.ready.borrow()
    }

    /// Stop accepting, then close the store
    pub async fn close(&self) -> Result<()> {
        let listener = {
            let slot = self.listener.lock().await;
            self.closed.store(true, Ordering::SeqCst);
            slot.clone()
        };
        // Wakes a run loop parked on admission while every permit is held
        if let Some(gate) = &self.admission {
            gate.close();
        }
        match listener {
            Some(listener) => listener.close().await,
            None => warn!("Close called before the server was listening"),
        }

        if let Err(e) = self.store.close().await {
            error!(error = %e, "Failed to close store");
            return Err(e.into());
        }
        info!("Registry server closed");
        Ok(())
    }

    pub fn inbound_pool_stats(&self) -> PoolStats {
        self.pools.inbound_stats()
    }

    pub fn outbound_pool_stats(&self) -> PoolStats {
        self.pools.outbound_stats()
    }
}
