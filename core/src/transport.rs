//! The one piece that performs network I/O.
//!
//! # Design
//! `Transport` takes a fully shaped `HttpRequest` and hands back the raw
//! `HttpResponse`. Non-2xx statuses are data, not errors: status
//! interpretation belongs to validation. Only failures that leave no response
//! behind are `TransportError`s.
//!
//! `UreqTransport` runs a blocking ureq agent on tokio's blocking pool with
//! status-as-error disabled, so 4xx/5xx come back as responses.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{TransportError, TransportErrorKind};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// HTTP transport backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || execute(&agent, &request))
            .await
            .map_err(|e| {
                let kind = if e.is_cancelled() {
                    TransportErrorKind::Aborted
                } else {
                    TransportErrorKind::Opaque
                };
                TransportError::new(kind, format!("transport task failed: {e}"))
            })?
    }
}

fn execute(agent: &ureq::Agent, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
    debug!(method = %req.method, url = %req.url, "sending request");
    let result = match req.method {
        HttpMethod::Get => {
            let mut builder = agent.get(&req.url);
            for (k, v) in &req.headers {
                builder = builder.header(k.as_str(), v.as_str());
            }
            for (k, v) in &req.query {
                builder = builder.query(k, v);
            }
            builder.call()
        }
        _ => {
            let mut builder = agent.post(&req.url);
            for (k, v) in &req.headers {
                builder = builder.header(k.as_str(), v.as_str());
            }
            for (k, v) in &req.query {
                builder = builder.query(k, v);
            }
            match &req.body {
                Some(body) => builder.send(body.as_bytes()),
                None => builder.send_empty(),
            }
        }
    };

    let mut response = result.map_err(TransportError::from)?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = response.body_mut().read_to_string().map_err(TransportError::from)?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

/// Nothing in this client cancels an in-flight socket, so an OS-level
/// connection abort is a network fault. `Aborted` is reserved for the
/// blocking task being cancelled at runtime shutdown.
impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        let kind = match &err {
            ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
                TransportErrorKind::Network
            }
            ureq::Error::Io(io) => match io.kind() {
                std::io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
                _ => TransportErrorKind::Network,
            },
            _ => TransportErrorKind::Opaque,
        };
        TransportError::new(kind, err.to_string())
    }
}
