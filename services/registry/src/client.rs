//! # Registry Client
//!
//! One request per connection, mirroring the server: connect with mutual
//! TLS, write one request frame, read one response frame, close.

use crate::error::{Result, ServiceError};
use bytes::BytesMut;
use codec::{decode_response, Action, MessageBuilder, Record, Request, Response};
use network::{connect_tls, read_frame, write_frame, TlsConfig};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct RegistryClient {
    address: String,
    server_name: String,
    tls: TlsConfig,
    connect_timeout: Duration,
    max_message_size: usize,
}

impl RegistryClient {
    pub fn new(address: impl Into<String>, server_name: impl Into<String>, tls: TlsConfig) -> Self {
        Self {
            address: address.into(),
            server_name: server_name.into(),
            tls,
            connect_timeout: Duration::from_millis(network::DEFAULT_CONNECT_TIMEOUT_MS),
            max_message_size: network::DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// All records, in insertion order
    pub async fn list(&self) -> Result<Vec<Record>> {
        match self.request(&Request::list()).await? {
            Response::Records(records) => Ok(records),
            Response::Record { record, .. } if record.is_error() => Ok(vec![record]),
            other => Err(unexpected(Action::List, &other)),
        }
    }

    /// Create `name`; a rejection comes back as a record with an error
    pub async fn create(&self, name: &str) -> Result<Record> {
        self.single(Action::Create, &Request::create(name)).await
    }

    /// Look up `name`; a missing name comes back as a `NotFound` error record
    pub async fn read(&self, name: &str) -> Result<Record> {
        self.single(Action::Read, &Request::read(name)).await
    }

    pub async fn request(&self, request: &Request) -> Result<Response> {
        let mut builder = MessageBuilder::new();
        let message = builder.encode_request(request);
        debug!(action = %request.action, bytes = message.len(), "Sending request");
        self.send_raw(message).await
    }

    /// Send an already encoded message and decode the reply
    pub async fn send_raw(&self, message: &[u8]) -> Result<Response> {
        let mut stream = connect_tls(
            self.address.as_str(),
            &self.tls,
            &self.server_name,
            self.connect_timeout,
        )
        .await?;

        write_frame(&mut stream, message, self.max_message_size).await?;

        let mut buf = BytesMut::new();
        let payload = read_frame(&mut stream, &mut buf, self.max_message_size).await?;
        let response = decode_response(payload)?;

        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "Shutdown after response failed");
        }
        Ok(response)
    }

    async fn single(&self, action: Action, request: &Request) -> Result<Record> {
        match self.request(request).await? {
            Response::Record { record, .. } => Ok(record),
            other => Err(unexpected(action, &other)),
        }
    }
}

fn unexpected(action: Action, response: &Response) -> ServiceError {
    let shape = match response {
        Response::Record { action, .. } => format!("single record for {action}"),
        Response::Records(records) => format!("list of {} records", records.len()),
    };
    ServiceError::UnexpectedResponse(format!("{action} request answered with {shape}"))
}
