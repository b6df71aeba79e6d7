//! C-ABI wrapper around the I/O-free parts of `iznik-core`.
//!
//! # Overview
//! Exposes request shaping, envelope validation and transport-anomaly
//! classification through `extern "C"` functions, so a host in any language
//! with a C FFI can perform the HTTP round-trip itself and still apply the
//! same policy as `ApiClient::dispatch`:
//! 1. `iznik_build_request` → execute it;
//! 2. on a transport failure, `iznik_classify_transport_error` says whether to
//!    wait `iznik_retry_delay_ms` and resend once, drop the call, or settle
//!    with no response;
//! 3. `iznik_is_recognizable` says whether a response counts as empty (and so
//!    earns the same single retry);
//! 4. `iznik_settle_response` classifies the final response.
//!
//! # Design
//! - No panic unwinds into C: each entry point runs under `catch_unwind` and
//!   maps a panic to null, `false`, `FallThrough` or an `FfiErrorCode::Panic`.
//! - Pointers handed out here belong to the host until it passes them back to
//!   `iznik_free_request`, `iznik_free_result` or `iznik_free_string`.
//! - Telemetry stays with the host; the settle result carries everything the
//!   host needs to decide.

pub mod types;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::catch_unwind;

use iznik_core::{
    envelope, validate, Anomaly, ClientConfig, HttpMethod, HttpRequest, HttpResponse,
    RequestSpec,
};

use types::*;

/// Read a nullable C string. Null and invalid UTF-8 both yield `None`.
fn opt_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client bound to `base_url` with default settings.
///
/// Returns null if `base_url` is null, is not valid UTF-8, or if an internal
/// panic occurs.
/// The caller must free the returned pointer with `iznik_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn iznik_client_new(base_url: *const c_char) -> *mut FfiClient {
    catch_unwind(|| {
        let Some(url) = opt_str(base_url) else {
            return std::ptr::null_mut();
        };
        Box::into_raw(Box::new(FfiClient {
            inner: ClientConfig::new(url),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `iznik_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn iznik_client_free(client: *mut FfiClient) {
    if !client.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(client) });
        });
    }
}

/// Milliseconds to wait before the single retry of a transient anomaly.
/// Returns 0 if `client` is null.
#[unsafe(no_mangle)]
pub extern "C" fn iznik_retry_delay_ms(client: *const FfiClient) -> u64 {
    if client.is_null() {
        return 0;
    }
    catch_unwind(|| unsafe { &*client }.inner.retry_delay_ms).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Request shaping
// ---------------------------------------------------------------------------

/// Parse a JSON object of query parameters. Non-string values are rendered
/// as JSON text.
fn parse_query(json: &str) -> Option<Vec<(String, String)>> {
    let serde_json::Value::Object(fields) = serde_json::from_str(json).ok()? else {
        return None;
    };
    Some(
        fields
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect(),
    )
}

/// Build a wire-ready request.
///
/// `query_json` (a JSON object) and `body_json` may be null. PUT, PATCH and
/// DELETE come back as POST with an `X-HTTP-Method-Override` header, and
/// `operator_mode` is carried under the client's operator flag key.
/// Returns null if `client` or `path` is null, or if either JSON argument is
/// malformed.
#[unsafe(no_mangle)]
pub extern "C" fn iznik_build_request(
    client: *const FfiClient,
    method: FfiHttpMethod,
    path: *const c_char,
    query_json: *const c_char,
    body_json: *const c_char,
    operator_mode: bool,
) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if client.is_null() || path.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        let Some(path) = opt_str(path) else {
            return std::ptr::null_mut();
        };

        let mut spec = RequestSpec::new(method.into(), path);
        if let Some(query) = opt_str(query_json) {
            match parse_query(query) {
                Some(pairs) => spec.query = pairs,
                None => return std::ptr::null_mut(),
            }
        }
        if let Some(body) = opt_str(body_json) {
            match serde_json::from_str(body) {
                Ok(value) => spec.body = Some(value),
                Err(_) => return std::ptr::null_mut(),
            }
        }

        let config = &client.inner;
        match spec.to_http(&config.base_url, &config.operator_flag, operator_mode) {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

/// Convert an `FfiHttpResponse` to a core `HttpResponse`. A null body is
/// treated as empty.
fn ffi_response_to_core(resp: &FfiHttpResponse) -> HttpResponse {
    HttpResponse::new(resp.status, opt_str(resp.body).unwrap_or(""))
}

/// Whether a response has a status and a recognisable envelope. A response
/// that is not earns one retry, like a timeout. False if `response` is null.
#[unsafe(no_mangle)]
pub extern "C" fn iznik_is_recognizable(response: *const FfiHttpResponse) -> bool {
    if response.is_null() {
        return false;
    }
    catch_unwind(|| envelope::is_recognizable(&ffi_response_to_core(unsafe { &*response })))
        .unwrap_or(false)
}

/// Classify the final response of a call to `path`.
///
/// `method` is the verb the request was built with; it is reduced to the
/// physical verb before classification. `response` may be null when the
/// transport produced nothing, which settles as `Rejected` with no `ret`.
#[unsafe(no_mangle)]
pub extern "C" fn iznik_settle_response(
    method: FfiHttpMethod,
    path: *const c_char,
    response: *const FfiHttpResponse,
) -> *mut FfiSettleResult {
    catch_unwind(|| {
        let Some(path) = opt_str(path) else {
            return FfiSettleResult::null_arg("path");
        };
        let request = HttpRequest {
            method: HttpMethod::from(method).physical(),
            url: path.to_string(),
            path: path.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        };
        let core_resp = if response.is_null() {
            None
        } else {
            Some(ffi_response_to_core(unsafe { &*response }))
        };
        match validate::settle(&request, core_resp.as_ref()) {
            Ok(envelope) => FfiSettleResult::ok(envelope),
            Err(e) => FfiSettleResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiSettleResult::panic("panic in iznik_settle_response"))
}

/// Decide what to do about a transport failure described only by its message.
/// A null message falls through.
#[unsafe(no_mangle)]
pub extern "C" fn iznik_classify_transport_error(
    client: *const FfiClient,
    message: *const c_char,
) -> FfiRetryAction {
    catch_unwind(|| {
        let policy = if client.is_null() {
            iznik_core::RetryPolicy::default()
        } else {
            unsafe { &*client }.inner.retry_policy()
        };
        let anomaly = opt_str(message).map_or(Anomaly::Unclassified, Anomaly::from_message);
        policy.action(anomaly).into()
    })
    .unwrap_or(FfiRetryAction::FallThrough)
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiHttpRequest` returned by `iznik_build_request`.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn iznik_free_request(req: *mut FfiHttpRequest) {
    if req.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let req = unsafe { Box::from_raw(req) };
        for s in [req.url, req.path, req.body] {
            if !s.is_null() {
                drop(unsafe { CString::from_raw(s) });
            }
        }
        free_pairs(req.headers, req.headers_len);
        free_pairs(req.query, req.query_len);
    });
}

/// Free an `FfiSettleResult` returned by `iznik_settle_response`.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn iznik_free_result(result: *mut FfiSettleResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        for s in [result.error_message, result.status_text, result.payload_json] {
            if !s.is_null() {
                drop(unsafe { CString::from_raw(s) });
            }
        }
    });
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn iznik_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
