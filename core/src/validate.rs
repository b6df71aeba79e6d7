//! Classification of completed responses.
//!
//! # Design
//! A response is a success only when HTTP says 200 and the envelope's `ret`
//! is one the application treats as fine:
//! - `0`;
//! - `1` with status "Not logged in", which many callers handle themselves;
//! - anything at all for `POST /session`, the login negotiation endpoint;
//! - `999`, a double-submit whose first submission already went through.
//!
//! The success rule is checked first. Of what remains, `ret == 111` is a
//! maintenance window whatever the HTTP status, and everything else is
//! rejected.

use tracing::debug;

use crate::envelope::{ResponseEnvelope, RET_DUPLICATE, RET_MAINTENANCE, RET_OK};
use crate::error::{ApiError, ErrorContext};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Path of the authentication endpoint, which may return any `ret` on POST.
pub const SESSION_PATH: &str = "/session";

/// Outcome of classifying one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Maintenance,
    Rejected,
}

/// Classify a response envelope for the given path and physical method.
///
/// A missing envelope is always `Rejected`.
pub fn classify(path: &str, method: HttpMethod, envelope: Option<&ResponseEnvelope>) -> Verdict {
    let Some(envelope) = envelope else {
        return Verdict::Rejected;
    };

    let accepted = envelope.http_status == 200
        && (envelope.ret == Some(RET_OK)
            || envelope.is_not_logged_in()
            || (path == SESSION_PATH && method == HttpMethod::Post)
            || envelope.ret == Some(RET_DUPLICATE));

    if accepted {
        Verdict::Success
    } else if envelope.ret == Some(RET_MAINTENANCE) {
        Verdict::Maintenance
    } else {
        Verdict::Rejected
    }
}

/// Turn whatever the transport produced into an envelope or a typed error.
///
/// `response` is `None` when the transport never produced one. This never
/// reports to telemetry; that decision belongs to the dispatcher.
pub fn settle(
    request: &HttpRequest,
    response: Option<&HttpResponse>,
) -> Result<ResponseEnvelope, ApiError> {
    let envelope = response.and_then(ResponseEnvelope::from_response);
    let verdict = classify(&request.path, request.method, envelope.as_ref());
    debug!(path = %request.path, ?verdict, "classified response");

    match (verdict, envelope) {
        (Verdict::Success, Some(envelope)) => Ok(envelope),
        (Verdict::Maintenance, _) => Err(ApiError::Maintenance(Box::new(ErrorContext::new(
            request, response,
        )))),
        (_, envelope) => Err(ApiError::Rejected {
            ret: envelope.as_ref().and_then(|e| e.ret),
            status: envelope.and_then(|e| e.status),
            context: Box::new(ErrorContext::new(request, response)),
        }),
    }
}
