//! # Replay Transport
//!
//! Turns a pending entry into an HTTP request and sends it. Translation is a
//! pure step that can fail on malformed entries; sending is behind the
//! [`Transport`] trait so tests can substitute a scripted fake.

use crate::offline::queue::{OperationKind, PendingOperation};
use crate::shared::config::join_url;
use crate::shared::SyncError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use std::time::Duration;

/// A fully resolved request ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRequest {
    pub kind: OperationKind,
    pub url: Url,
    pub body: Option<Value>,
}

impl ReplayRequest {
    /// HTTP method for this request
    pub fn method(&self) -> Method {
        match self.kind {
            OperationKind::Create => Method::POST,
            OperationKind::Update => Method::PUT,
            OperationKind::Delete => Method::DELETE,
        }
    }
}

/// Resolve `op` against `base_url`
///
/// Fails with `SyncError::Translation` when the entry breaks the
/// payload/kind pairing or its target does not form a valid URL.
pub fn translate(op: &PendingOperation, base_url: &str) -> Result<ReplayRequest, SyncError> {
    match (op.kind.expects_payload(), &op.payload) {
        (true, None) | (true, Some(Value::Null)) => {
            return Err(SyncError::translation(format!(
                "{} entry {} has no payload",
                op.kind.method(),
                op.id
            )));
        }
        (false, Some(_)) => {
            return Err(SyncError::translation(format!(
                "DELETE entry {} carries a payload",
                op.id
            )));
        }
        _ => {}
    }

    if op.target.trim().is_empty() {
        return Err(SyncError::translation(format!("entry {} has an empty target", op.id)));
    }

    let url = Url::parse(&join_url(base_url, &op.target))
        .map_err(|e| SyncError::translation(format!("invalid target '{}': {}", op.target, e)))?;

    Ok(ReplayRequest {
        kind: op.kind,
        url,
        body: op.payload.clone(),
    })
}

/// Sends replay requests to the remote API
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`; any non-2xx answer is an error
    async fn send(&self, request: &ReplayRequest) -> Result<(), SyncError>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    /// Client-side timeout, reported in `SyncError::Timeout`
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Build a transport whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::network(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timeout: Some(timeout),
        })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client, timeout: None }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ReplayRequest) -> Result<(), SyncError> {
        let mut builder = self
            .client
            .request(request.method(), request.url.clone())
            .header(CONTENT_TYPE, "application/json");

        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout {
                    millis: self.timeout.map_or(0, |t| t.as_millis() as u64),
                }
            } else {
                SyncError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
