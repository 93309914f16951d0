//! # Connection Handler
//!
//! Serves exactly one request per authenticated connection:
//!
//! ```text
//! Reading → Decoding → Dispatching → Encoding → Writing → Closed
//! ```
//!
//! Every state can fall through to `Closed`. Transport failures and an
//! unavailable store close the connection without a response; every other
//! outcome, including undecodable requests and rejected names, is answered
//! with one frame. Pooled buffers are returned on every path because they
//! are released by their guards.

use codec::{decode_request, Action, ErrorCode, MessageBuilder, ProtocolError, Record, Request};
use network::{read_frame, write_frame, BufferPools, TransportError};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use store::{Store, StoreError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// Per-connection limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerLimits {
    pub max_message_size: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for HandlerLimits {
    fn default() -> Self {
        Self {
            max_message_size: network::DEFAULT_MAX_FRAME_SIZE,
            read_timeout: Duration::from_millis(network::DEFAULT_READ_TIMEOUT_MS),
            write_timeout: Duration::from_millis(network::DEFAULT_WRITE_TIMEOUT_MS),
        }
    }
}

impl From<&service_config::LimitsConfig> for HandlerLimits {
    fn from(limits: &service_config::LimitsConfig) -> Self {
        Self {
            max_message_size: limits.max_message_size,
            read_timeout: limits.read_timeout(),
            write_timeout: limits.write_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Reading,
    Decoding,
    Dispatching,
    Encoding,
    Writing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Reading => "reading",
            ConnectionState::Decoding => "decoding",
            ConnectionState::Dispatching => "dispatching",
            ConnectionState::Encoding => "encoding",
            ConnectionState::Writing => "writing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// One response frame was written
    Responded,
    /// Closed without a response after failing in `state`
    Dropped { state: ConnectionState },
}

/// What the dispatcher decided to send back
enum Reply {
    Record { action: Action, record: Record },
    Records(Vec<Record>),
}

#[derive(Clone)]
pub struct ConnectionHandler {
    store: Arc<dyn Store>,
    pools: Arc<BufferPools>,
    limits: HandlerLimits,
}

impl ConnectionHandler {
    pub fn new(store: Arc<dyn Store>, pools: Arc<BufferPools>, limits: HandlerLimits) -> Self {
        Self {
            store,
            pools,
            limits,
        }
    }

    /// Serve one request on `stream`, then close it
    pub async fn handle<S>(&self, mut stream: S, peer: SocketAddr) -> ConnectionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let outcome = self.serve(&mut stream, peer).await;

        // Best effort: the peer may already be gone
        if let Err(e) = stream.shutdown().await {
            debug!(peer = %peer, error = %e, "Shutdown after response failed");
        }
        debug!(peer = %peer, state = %ConnectionState::Closed, ?outcome, "Connection closed");
        outcome
    }

    async fn serve<S>(&self, stream: &mut S, peer: SocketAddr) -> ConnectionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Reading
        let mut inbound = self.pools.checkout_inbound_buffer();
        let read = tokio::time::timeout(
            self.limits.read_timeout,
            read_frame(stream, &mut inbound, self.limits.max_message_size),
        )
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::timeout(
                "read_frame",
                self.limits.read_timeout.as_millis() as u64,
            ))
        });
        let payload = match read {
            Ok(payload) => payload,
            Err(e) => {
                log_transport_failure(peer, ConnectionState::Reading, &e);
                return ConnectionOutcome::Dropped {
                    state: ConnectionState::Reading,
                };
            }
        };

        // Decoding
        let decoded = decode_request(payload);
        self.pools.return_inbound_buffer(inbound);

        let reply = match decoded {
            Ok(request) => {
                // Dispatching
                info!(peer = %peer, action = %request.action, "Request received");
                match self.dispatch(request, peer).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        error!(
                            peer = %peer,
                            state = %ConnectionState::Dispatching,
                            category = e.category(),
                            error = %e,
                            "Store unavailable; closing without response"
                        );
                        return ConnectionOutcome::Dropped {
                            state: ConnectionState::Dispatching,
                        };
                    }
                }
            }
            Err(e) => {
                warn!(
                    peer = %peer,
                    state = %ConnectionState::Decoding,
                    category = e.category(),
                    error = %e,
                    "Rejecting undecodable request"
                );
                decode_failure_reply(&e)
            }
        };

        // Encoding
        let mut builder = self.pools.checkout_outbound_builder();
        let mut message = encode_reply(&mut builder, &reply);
        if message.len() > self.limits.max_message_size {
            warn!(
                peer = %peer,
                state = %ConnectionState::Encoding,
                bytes = message.len(),
                max = self.limits.max_message_size,
                "Response exceeds frame limit; answering with an error record"
            );
            let fallback = oversized_reply(message.len(), self.limits.max_message_size);
            message = encode_reply(&mut builder, &fallback);
        }

        // Writing
        let written = tokio::time::timeout(
            self.limits.write_timeout,
            write_frame(stream, message, self.limits.max_message_size),
        )
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::timeout(
                "write_frame",
                self.limits.write_timeout.as_millis() as u64,
            ))
        });

        match written {
            Ok(()) => ConnectionOutcome::Responded,
            Err(e) => {
                log_transport_failure(peer, ConnectionState::Writing, &e);
                ConnectionOutcome::Dropped {
                    state: ConnectionState::Writing,
                }
            }
        }
    }

    /// Run the request against the store
    ///
    /// Rejections become error records; only an unavailable store is an `Err`.
    async fn dispatch(&self, request: Request, peer: SocketAddr) -> Result<Reply, StoreError> {
        let Request {
            action,
            target_name,
        } = request;

        match action {
            Action::List => {
                let records = self.store.list().await?;
                debug!(peer = %peer, count = records.len(), "Listing records");
                Ok(Reply::Records(
                    records
                        .into_iter()
                        .map(|stored| Record::named(stored.name))
                        .collect(),
                ))
            }
            Action::Create => {
                let created = self.store.create(&target_name).await;
                let record = match created {
                    Ok(stored) => {
                        info!(peer = %peer, name = %stored.name, "Record created");
                        Record::named(stored.name)
                    }
                    Err(e) if e.is_rejection() => {
                        info!(peer = %peer, name = %target_name, reason = %e, "Create rejected");
                        Record::failed(target_name, ErrorCode::ValidationFailed, e.to_string())
                    }
                    Err(e) => return Err(e),
                };
                Ok(Reply::Record { action, record })
            }
            Action::Read => {
                let found = self.store.get_by_name(&target_name).await?;
                let record = match found {
                    Some(stored) => Record::with_id(stored.id, stored.name),
                    None => {
                        debug!(peer = %peer, name = %target_name, "Record not found");
                        let message = format!("No record named {target_name}");
                        Record::failed(target_name, ErrorCode::NotFound, message)
                    }
                };
                Ok(Reply::Record { action, record })
            }
        }
    }
}

fn encode_reply<'b>(builder: &'b mut MessageBuilder, reply: &Reply) -> &'b [u8] {
    match reply {
        Reply::Record { action, record } => builder.encode_record(*action, record),
        Reply::Records(records) => builder.encode_record_list(records),
    }
}

/// Replacement for an answer that cannot fit in one frame
fn oversized_reply(size: usize, max: usize) -> Reply {
    Reply::Record {
        action: Action::List,
        record: Record::failed(
            "",
            ErrorCode::ResponseTooLarge,
            format!("Response of {size} bytes exceeds the {max} byte frame limit"),
        ),
    }
}

fn decode_failure_reply(error: &ProtocolError) -> Reply {
    Reply::Record {
        // No trustworthy action to echo; list is the neutral zero value
        action: Action::List,
        record: Record::failed("", error.error_code(), error.to_string()),
    }
}

fn log_transport_failure(peer: SocketAddr, state: ConnectionState, error: &TransportError) {
    match error {
        TransportError::ConnectionClosed { .. } => {
            debug!(peer = %peer, state = %state, "Peer closed connection");
        }
        _ => {
            warn!(
                peer = %peer,
                state = %state,
                category = error.category(),
                error = %error,
                "Connection dropped"
            );
        }
    }
}
