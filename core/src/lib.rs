//! Resilient client core for the iznik envelope API.
//!
//! # Overview
//! Every API call goes through `ApiClient::dispatch`, which waits for the
//! session, shapes the request, retries a transient transport anomaly once,
//! validates the `{ ret, status }` envelope and decides whether a failure is
//! worth reporting. Domain-specific API modules are thin wrappers on top.
//!
//! # Design
//! - Shaping (`request`) and validation (`validate`) are pure functions over
//!   the plain-data types in `http`, so they can be driven without I/O, as the
//!   C ABI crate does.
//! - Transport, session and telemetry are traits injected at construction;
//!   the core never picks an implementation based on platform.
//! - An aborted request resolves to `Outcome::Cancelled` instead of an error.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod request;
pub mod retry;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod validate;

pub use client::{ApiClient, Outcome};
pub use config::{ClientConfig, ConfigError};
pub use envelope::ResponseEnvelope;
pub use error::{
    ApiError, ErrorContext, LoginError, RequestContext, ResponseContext, SignUpError,
    TransportError, TransportErrorKind,
};
pub use http::{HttpMethod, HttpRequest, HttpResponse, METHOD_OVERRIDE_HEADER};
pub use request::{RequestSpec, OPERATOR_FLAG_KEY};
pub use retry::{Anomaly, RetryAction, RetryPolicy};
pub use session::{RestorableSession, SessionContext, StaticSession};
pub use telemetry::{LogDecision, TelemetryReporter, TracingReporter};
pub use transport::{Transport, UreqTransport};
pub use validate::{classify, settle, Verdict};
