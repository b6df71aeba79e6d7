//! Error types for the API client.
//!
//! # Design
//! `Maintenance` gets a dedicated variant because callers present a "come back
//! later" state for it and it is never reported to telemetry. Every other
//! response the server rejects lands in `Rejected` with the raw `ret`/`status`
//! pair and the full request/response context for diagnostics.
//!
//! Transport failures only surface here once the retry policy has given up on
//! them; a first timeout or network error is handled inside the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::ResponseEnvelope;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Marker rendered in messages when `ret` or `status` is absent.
pub const UNKNOWN: &str = "Unknown";

/// Errors returned by `ApiClient` dispatch and the validation helpers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The service declared a maintenance window (`ret == 111`).
    #[error("API down for maintenance: {} {}", .0.request.method, .0.request.path)]
    Maintenance(Box<ErrorContext>),

    /// The server rejected the call or answered with something that is not a
    /// valid envelope.
    #[error(
        "API Error {} {} -> ret: {} status: {}",
        .context.request.method,
        .context.request.path,
        ret_label(.ret),
        status_label(.status)
    )]
    Rejected {
        ret: Option<i64>,
        status: Option<String>,
        context: Box<ErrorContext>,
    },

    /// The transport failed and the retry policy did not recover it.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The request body could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A successful payload could not be decoded into the requested type.
    #[error("deserialization failed: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_maintenance(&self) -> bool {
        matches!(self, ApiError::Maintenance(_))
    }

    /// Diagnostic context, present for errors that came from a response.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ApiError::Maintenance(context) => Some(context),
            ApiError::Rejected { context, .. } => Some(context),
            _ => None,
        }
    }
}

pub(crate) fn ret_label(ret: &Option<i64>) -> String {
    ret.map(|r| r.to_string()).unwrap_or_else(|| UNKNOWN.to_string())
}

pub(crate) fn status_label(status: &Option<String>) -> &str {
    status.as_deref().unwrap_or(UNKNOWN)
}

/// What kind of transport failure occurred, when the transport can tell.
///
/// `Opaque` means the transport only has a message; classification then
/// falls back to matching on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportErrorKind {
    Timeout,
    Network,
    Aborted,
    Opaque,
}

/// A transport-level failure: no HTTP response was produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn opaque(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Opaque, message)
    }
}

/// The request half of an `ErrorContext`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub path: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// The response half of an `ErrorContext`. Both fields are empty when the
/// transport never produced a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseContext {
    pub http_status: Option<u16>,
    pub envelope: Option<Value>,
}

/// Request and response snapshot attached to response-derived errors.
///
/// Holds only what the caller supplied plus what the server returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub request: RequestContext,
    pub response: ResponseContext,
}

impl ErrorContext {
    pub fn new(request: &HttpRequest, response: Option<&HttpResponse>) -> Self {
        let body = request
            .body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok());
        Self {
            request: RequestContext {
                path: request.path.clone(),
                method: request.method,
                headers: request.headers.clone(),
                query: request.query.clone(),
                body,
            },
            response: ResponseContext {
                http_status: response.map(|r| r.status).filter(|s| *s != 0),
                envelope: response.and_then(|r| serde_json::from_str(&r.body).ok()),
            },
        }
    }
}

/// Failure reported by the login flow from a raw `ret`/`status` pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}")]
pub struct LoginError {
    pub ret: Option<i64>,
    pub status: String,
}

impl LoginError {
    pub fn new(ret: i64, status: impl Into<String>) -> Self {
        Self {
            ret: Some(ret),
            status: status.into(),
        }
    }

    pub fn from_envelope(envelope: &ResponseEnvelope) -> Self {
        Self {
            ret: envelope.ret,
            status: envelope.status_label().to_string(),
        }
    }
}

/// Failure reported by the sign-up flow from a raw `ret`/`status` pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}")]
pub struct SignUpError {
    pub ret: Option<i64>,
    pub status: String,
}

impl SignUpError {
    pub fn new(ret: i64, status: impl Into<String>) -> Self {
        Self {
            ret: Some(ret),
            status: status.into(),
        }
    }

    pub fn from_envelope(envelope: &ResponseEnvelope) -> Self {
        Self {
            ret: envelope.ret,
            status: envelope.status_label().to_string(),
        }
    }
}
