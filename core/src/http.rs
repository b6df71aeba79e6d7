//! HTTP transport types for the host-does-IO boundary.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. Request
//! shaping produces `HttpRequest` values and validation consumes
//! `HttpResponse` values; the only code that touches the network is a
//! `Transport` implementation. The C ABI crate drives the same types with the
//! host performing the I/O.
//!
//! All fields use owned types (`String`, `Vec`) so values can cross FFI
//! boundaries without lifetime concerns.

use serde::{Deserialize, Serialize};

/// Header that carries the logical verb when PUT/PATCH/DELETE travel as POST.
pub const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";

/// HTTP method of a call, as the caller means it.
///
/// Only `Get` and `Post` ever reach the wire; the others are tunnelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Parse an upper-case verb. Returns `None` for anything else.
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    /// The verb actually sent: GET stays GET, everything else is POST.
    pub fn physical(self) -> Self {
        match self {
            HttpMethod::Get => HttpMethod::Get,
            _ => HttpMethod::Post,
        }
    }

    /// Whether this verb has to be tunnelled through POST.
    pub fn needs_override(self) -> bool {
        matches!(self, HttpMethod::Put | HttpMethod::Patch | HttpMethod::Delete)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound HTTP request described as plain data.
///
/// `method` is always the physical verb (GET or POST). `path` is kept next to
/// the full `url` because validation rules and error context are keyed on it.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Look up a header value, ignoring case of the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The verb the caller asked for, recovered from the override header.
    pub fn logical_method(&self) -> HttpMethod {
        self.header(METHOD_OVERRIDE_HEADER)
            .and_then(HttpMethod::parse)
            .unwrap_or(self.method)
    }
}

/// An HTTP response described as plain data.
///
/// A `status` of 0 means the transport produced no status at all.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}
