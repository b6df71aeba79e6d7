//! Request shaping: caller intent in, wire-ready `HttpRequest` out.
//!
//! # Design
//! A `RequestSpec` is what the caller means; `to_http` derives a fresh
//! `HttpRequest` from it without touching the spec. Two rules are applied on
//! the way:
//! - PUT/PATCH/DELETE go out as POST with `X-HTTP-Method-Override`, since the
//!   transport only speaks GET and POST.
//! - The operator-mode flag is written into the query for GET and into the
//!   JSON body for POST, so no caller has to remember it.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, METHOD_OVERRIDE_HEADER};

/// Key under which the operator-mode flag travels.
pub const OPERATOR_FLAG_KEY: &str = "modtools";

/// A single API call as the caller describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Shape the outbound request for `base_url`, carrying `operator_mode`
    /// under `flag_key`.
    pub fn to_http(
        &self,
        base_url: &str,
        flag_key: &str,
        operator_mode: bool,
    ) -> Result<HttpRequest, ApiError> {
        let method = self.method.physical();
        let mut headers = self.headers.clone();
        if self.method.needs_override() {
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case(METHOD_OVERRIDE_HEADER));
            headers.push((
                METHOD_OVERRIDE_HEADER.to_string(),
                self.method.as_str().to_string(),
            ));
        }

        let mut query = self.query.clone();
        let mut body = None;
        if method == HttpMethod::Get {
            query.retain(|(k, _)| k != flag_key);
            query.push((flag_key.to_string(), operator_mode.to_string()));
            if self.body.is_some() {
                warn!(path = %self.path, "dropping body on GET request");
            }
        } else {
            let value = with_flag(self.body.clone(), &self.path, flag_key, operator_mode);
            let encoded =
                serde_json::to_string(&value).map_err(|e| ApiError::Serialization(e.to_string()))?;
            headers.push(("content-type".to_string(), "application/json".to_string()));
            body = Some(encoded);
        }

        Ok(HttpRequest {
            method,
            url: format!("{}{}", base_url.trim_end_matches('/'), self.path),
            path: self.path.clone(),
            headers,
            query,
            body,
        })
    }
}

fn with_flag(body: Option<Value>, path: &str, flag_key: &str, operator_mode: bool) -> Value {
    match body {
        None | Some(Value::Null) => {
            let mut fields = Map::new();
            fields.insert(flag_key.to_string(), Value::Bool(operator_mode));
            Value::Object(fields)
        }
        Some(Value::Object(mut fields)) => {
            fields.insert(flag_key.to_string(), Value::Bool(operator_mode));
            Value::Object(fields)
        }
        Some(other) => {
            warn!(%path, "request body is not an object; operator flag not sent");
            other
        }
    }
}
