//! The `{ ret, status, ... }` response envelope.
//!
//! # Design
//! Every API response body is a JSON object carrying an application return
//! code `ret` and a human-readable `status`; the remaining fields are the
//! payload. The HTTP status travels separately and is copied in so that a
//! single value describes the whole outcome.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ApiError, UNKNOWN};
use crate::http::HttpResponse;

/// `ret` for a call that succeeded.
pub const RET_OK: i64 = 0;
/// `ret` for an anonymous session; paired with `STATUS_NOT_LOGGED_IN`.
pub const RET_NOT_LOGGED_IN: i64 = 1;
/// `ret` while the service is in a declared maintenance window.
pub const RET_MAINTENANCE: i64 = 111;
/// `ret` for a duplicate submission (double click).
pub const RET_DUPLICATE: i64 = 999;
/// `status` that accompanies `RET_NOT_LOGGED_IN`.
pub const STATUS_NOT_LOGGED_IN: &str = "Not logged in";

/// A parsed response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub http_status: u16,
    pub ret: Option<i64>,
    pub status: Option<String>,
    /// Every field of the body other than `ret` and `status`.
    pub payload: Map<String, Value>,
}

impl ResponseEnvelope {
    /// Parse a response into an envelope.
    ///
    /// Returns `None` unless the body is a JSON object with a `ret` key. A
    /// `ret` that is not an integer is kept as `None` so the envelope is
    /// still recognised but never matches a known code.
    pub fn from_response(response: &HttpResponse) -> Option<Self> {
        let body: Value = serde_json::from_str(&response.body).ok()?;
        let Value::Object(mut fields) = body else {
            return None;
        };
        let ret = fields.remove("ret")?;
        let status = fields
            .remove("status")
            .and_then(|s| s.as_str().map(str::to_string));
        Some(Self {
            http_status: response.status,
            ret: ret.as_i64(),
            status,
            payload: fields,
        })
    }

    /// Decode the payload into a caller-defined type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(Value::Object(self.payload.clone()))
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub fn ret_label(&self) -> String {
        crate::error::ret_label(&self.ret)
    }

    pub fn status_label(&self) -> &str {
        self.status.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn is_not_logged_in(&self) -> bool {
        self.ret == Some(RET_NOT_LOGGED_IN) && self.status.as_deref() == Some(STATUS_NOT_LOGGED_IN)
    }
}

/// Whether a response has both a status and a recognisable envelope.
///
/// Anything else is treated by the dispatcher as an empty response.
pub fn is_recognizable(response: &HttpResponse) -> bool {
    response.status != 0 && ResponseEnvelope::from_response(response).is_some()
}
