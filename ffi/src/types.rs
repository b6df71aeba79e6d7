//! Plain C layouts for requests, responses and settle results.
//!
//! Strings cross as NUL-terminated `c_char` pointers, lists as pointer plus
//! count, enums with fixed discriminants. Everything this module allocates is
//! released by one of the `iznik_free_*` functions in `lib.rs`.

use std::ffi::CString;
use std::os::raw::c_char;

use iznik_core::{ApiError, HttpMethod, RetryAction};

/// Opaque handle to a client configuration. C callers receive a pointer to
/// this and pass it back into every FFI function that needs one.
pub struct FfiClient {
    pub(crate) inner: iznik_core::ClientConfig,
}

// ---------------------------------------------------------------------------
// Outbound request
// ---------------------------------------------------------------------------

/// Logical verb. Requests built by this library only ever carry `Get` or `Post`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Patch = 3,
    Delete = 4,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Patch => FfiHttpMethod::Patch,
            HttpMethod::Delete => FfiHttpMethod::Delete,
        }
    }
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Patch => HttpMethod::Patch,
            FfiHttpMethod::Delete => HttpMethod::Delete,
        }
    }
}

/// A key-value pair of C strings, used for headers and query parameters.
#[repr(C)]
pub struct FfiPair {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// A wire-ready HTTP request described as C-compatible plain data.
///
/// `method` is always GET or POST. Built by `iznik_build_request`; the C
/// caller executes it and passes the response to `iznik_settle_response`.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub url: *mut c_char,
    pub path: *mut c_char,
    pub headers: *mut FfiPair,
    pub headers_len: u32,
    pub query: *mut FfiPair,
    pub query_len: u32,
    pub body: *mut c_char,
}

/// Lossy `CString` for data that may contain interior NULs.
pub(crate) fn c_string(s: impl Into<Vec<u8>>) -> *mut c_char {
    let mut bytes = s.into();
    bytes.retain(|b| *b != 0);
    CString::new(bytes).unwrap_or_default().into_raw()
}

fn pairs_into_raw(pairs: Vec<(String, String)>) -> (*mut FfiPair, u32) {
    if pairs.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let mut ffi_pairs: Vec<FfiPair> = pairs
        .into_iter()
        .map(|(k, v)| FfiPair {
            key: c_string(k),
            value: c_string(v),
        })
        .collect();
    ffi_pairs.shrink_to_fit();
    let len = ffi_pairs.len() as u32;
    let ptr = ffi_pairs.as_mut_ptr();
    std::mem::forget(ffi_pairs);
    (ptr, len)
}

/// Free a pair array produced by `pairs_into_raw`.
pub(crate) fn free_pairs(ptr: *mut FfiPair, len: u32) {
    if ptr.is_null() || len == 0 {
        return;
    }
    let pairs = unsafe { Vec::from_raw_parts(ptr, len as usize, len as usize) };
    for p in pairs {
        if !p.key.is_null() {
            drop(unsafe { CString::from_raw(p.key) });
        }
        if !p.value.is_null() {
            drop(unsafe { CString::from_raw(p.value) });
        }
    }
}

impl FfiHttpRequest {
    /// Move a shaped request onto the heap in C layout.
    pub(crate) fn from_core(req: iznik_core::HttpRequest) -> *mut Self {
        let (headers, headers_len) = pairs_into_raw(req.headers);
        let (query, query_len) = pairs_into_raw(req.query);
        let body = match req.body {
            Some(b) => c_string(b),
            None => std::ptr::null_mut(),
        };
        Box::into_raw(Box::new(FfiHttpRequest {
            method: req.method.into(),
            url: c_string(req.url),
            path: c_string(req.path),
            headers,
            headers_len,
            query,
            query_len,
            body,
        }))
    }
}

// ---------------------------------------------------------------------------
// Inbound response (owned by the host)
// ---------------------------------------------------------------------------

/// What the host got back from executing an `FfiHttpRequest`.
///
/// Borrowed for the duration of the call only. A `status` of 0 means no
/// status was received; a null `body` reads as empty.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub body: *const c_char,
}

// ---------------------------------------------------------------------------
// Settle result
// ---------------------------------------------------------------------------

/// Outcome codes returned in `FfiSettleResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    Maintenance = 1,
    Rejected = 2,
    Transport = 3,
    Serialization = 4,
    Panic = 5,
    NullArg = 6,
}

/// What the host should do after a transport failure.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiRetryAction {
    /// Wait `iznik_retry_delay_ms`, then resend the identical request once.
    RetryOnce = 0,
    /// Drop the call silently; it was cancelled.
    Suppress = 1,
    /// Settle with no response.
    FallThrough = 2,
}

impl From<RetryAction> for FfiRetryAction {
    fn from(action: RetryAction) -> Self {
        match action {
            RetryAction::RetryOnce { .. } => FfiRetryAction::RetryOnce,
            RetryAction::Suppress => FfiRetryAction::Suppress,
            RetryAction::FallThrough => FfiRetryAction::FallThrough,
        }
    }
}

/// Result of settling a response.
///
/// On `Ok`, `payload_json` holds the envelope's remaining fields as a JSON
/// object. On failure `error_message` is set. `ret` is meaningful only when
/// `has_ret` is true; `status_text` is null when the envelope had none.
#[repr(C)]
pub struct FfiSettleResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub has_ret: bool,
    pub ret: i64,
    pub status_text: *mut c_char,
    pub payload_json: *mut c_char,
}

impl FfiSettleResult {
    fn boxed(
        error_code: FfiErrorCode,
        error_message: Option<String>,
        http_status: u16,
        ret: Option<i64>,
        status_text: Option<String>,
        payload_json: Option<String>,
    ) -> *mut Self {
        Box::into_raw(Box::new(FfiSettleResult {
            error_code,
            error_message: error_message.map_or(std::ptr::null_mut(), c_string),
            http_status,
            has_ret: ret.is_some(),
            ret: ret.unwrap_or_default(),
            status_text: status_text.map_or(std::ptr::null_mut(), c_string),
            payload_json: payload_json.map_or(std::ptr::null_mut(), c_string),
        }))
    }

    /// Build a success result from a settled envelope.
    pub(crate) fn ok(envelope: iznik_core::ResponseEnvelope) -> *mut Self {
        let payload = serde_json::Value::Object(envelope.payload).to_string();
        Self::boxed(
            FfiErrorCode::Ok,
            None,
            envelope.http_status,
            envelope.ret,
            envelope.status,
            Some(payload),
        )
    }

    /// Map each `ApiError` variant onto its code, keeping `ret` and `status`
    /// for rejections.
    pub(crate) fn from_error(err: ApiError) -> *mut Self {
        let msg = err.to_string();
        let http_status = err
            .context()
            .and_then(|c| c.response.http_status)
            .unwrap_or(0);
        match err {
            ApiError::Maintenance(_) => {
                Self::boxed(FfiErrorCode::Maintenance, Some(msg), http_status, None, None, None)
            }
            ApiError::Rejected { ret, status, .. } => {
                Self::boxed(FfiErrorCode::Rejected, Some(msg), http_status, ret, status, None)
            }
            ApiError::Transport(_) => {
                Self::boxed(FfiErrorCode::Transport, Some(msg), 0, None, None, None)
            }
            ApiError::Serialization(_) | ApiError::Decode(_) => {
                Self::boxed(FfiErrorCode::Serialization, Some(msg), 0, None, None, None)
            }
        }
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::boxed(
            FfiErrorCode::NullArg,
            Some(format!("null argument: {name}")),
            0,
            None,
            None,
            None,
        )
    }

    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::boxed(FfiErrorCode::Panic, Some(msg.to_string()), 0, None, None, None)
    }
}
