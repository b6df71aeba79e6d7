//! The request dispatcher every API call funnels through.
//!
//! # Design
//! `ApiClient::dispatch` owns all cross-cutting policy:
//! 1. wait for the session to be restored;
//! 2. shape the outbound request (method override, operator flag);
//! 3. send it, resolving a transport anomaly through `RetryPolicy`;
//! 4. validate the envelope and, for rejected calls, consult the caller's
//!    `LogDecision` before reporting to telemetry.
//!
//! An aborted request resolves to `Outcome::Cancelled` rather than an error,
//! so page/shutdown cancellations never show up as failures. Each dispatch is
//! independent; concurrent calls share nothing but the collaborators.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::envelope::{self, ResponseEnvelope};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::request::RequestSpec;
use crate::retry::{Anomaly, RetryAction, RetryPolicy};
use crate::session::SessionContext;
use crate::telemetry::{LogDecision, TelemetryReporter};
use crate::transport::{Transport, UreqTransport};
use crate::validate;

/// Result of a dispatch that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    /// The request was aborted in flight; there is nothing to act on.
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

/// Resilient client for the envelope API.
#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    retry: RetryPolicy,
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionContext>,
    telemetry: Arc<dyn TelemetryReporter>,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        session: Arc<dyn SessionContext>,
        telemetry: Arc<dyn TelemetryReporter>,
    ) -> Self {
        Self {
            retry: config.retry_policy(),
            config,
            transport,
            session,
            telemetry,
        }
    }

    /// Build a client that talks HTTP through `UreqTransport`.
    pub fn with_ureq(
        config: ClientConfig,
        session: Arc<dyn SessionContext>,
        telemetry: Arc<dyn TelemetryReporter>,
    ) -> Self {
        let transport = Arc::new(UreqTransport::new(config.timeout()));
        Self::new(config, transport, session, telemetry)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one request and classify the result.
    ///
    /// On success the whole envelope is returned, so callers can still tell a
    /// `ret == 1` "Not logged in" apart from `ret == 0`.
    pub async fn dispatch(
        &self,
        spec: RequestSpec,
        log: impl Into<LogDecision>,
    ) -> Result<Outcome<ResponseEnvelope>, ApiError> {
        let log = log.into();
        let span = info_span!(
            "dispatch",
            request_id = %Uuid::new_v4(),
            method = %spec.method,
            path = %spec.path,
        );
        self.run(&spec, &log).instrument(span).await
    }

    pub async fn get(
        &self,
        path: &str,
        query: Vec<(String, String)>,
        log: impl Into<LogDecision>,
    ) -> Result<Outcome<ResponseEnvelope>, ApiError> {
        let mut spec = RequestSpec::get(path);
        spec.query = query;
        self.dispatch(spec, log).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Value,
        log: impl Into<LogDecision>,
    ) -> Result<Outcome<ResponseEnvelope>, ApiError> {
        self.dispatch(RequestSpec::post(path).with_body(body), log).await
    }

    /// PUT, sent as POST with an override header.
    pub async fn put(
        &self,
        path: &str,
        body: Value,
        log: impl Into<LogDecision>,
    ) -> Result<Outcome<ResponseEnvelope>, ApiError> {
        self.dispatch(RequestSpec::put(path).with_body(body), log).await
    }

    /// PATCH, sent as POST with an override header.
    pub async fn patch(
        &self,
        path: &str,
        body: Value,
        log: impl Into<LogDecision>,
    ) -> Result<Outcome<ResponseEnvelope>, ApiError> {
        self.dispatch(RequestSpec::patch(path).with_body(body), log).await
    }

    /// DELETE, sent as POST with an override header.
    pub async fn delete(
        &self,
        path: &str,
        body: Value,
        log: impl Into<LogDecision>,
    ) -> Result<Outcome<ResponseEnvelope>, ApiError> {
        self.dispatch(RequestSpec::delete(path).with_body(body), log).await
    }

    async fn run(
        &self,
        spec: &RequestSpec,
        log: &LogDecision,
    ) -> Result<Outcome<ResponseEnvelope>, ApiError> {
        self.session.ready().await;
        let operator_mode = self.session.flag(&self.config.operator_flag);
        let request =
            spec.to_http(&self.config.base_url, &self.config.operator_flag, operator_mode)?;

        let response = match self.attempt(&request).await {
            Ok(response) => Some(response),
            Err(anomaly) => match self.retry.action(anomaly) {
                RetryAction::RetryOnce { delay } => {
                    warn!(?anomaly, ?delay, "transient anomaly, retrying once");
                    tokio::time::sleep(delay).await;
                    Some(self.transport.send(&request).await?)
                }
                RetryAction::Suppress => {
                    info!("request aborted, resolving as cancelled");
                    return Ok(Outcome::Cancelled);
                }
                RetryAction::FallThrough => {
                    warn!(?anomaly, "unclassified anomaly, validating without a response");
                    None
                }
            },
        };

        match validate::settle(&request, response.as_ref()) {
            Ok(envelope) => Ok(Outcome::Completed(envelope)),
            Err(err @ ApiError::Maintenance(_)) => {
                info!("down for maintenance");
                Err(err)
            }
            Err(err) => {
                let envelope = response.as_ref().and_then(ResponseEnvelope::from_response);
                let report = log.should_report(envelope.as_ref());
                info!(report, "request rejected");
                if report {
                    self.telemetry
                        .report(&failure_report(&request, response.as_ref(), envelope.as_ref()));
                }
                Err(err)
            }
        }
    }

    /// One send. A response without a status or an envelope counts as an
    /// anomaly, the same as a transport error.
    async fn attempt(&self, request: &HttpRequest) -> Result<HttpResponse, Anomaly> {
        match self.transport.send(request).await {
            Ok(response) if envelope::is_recognizable(&response) => Ok(response),
            Ok(response) => {
                warn!(status = response.status, "suspicious empty response");
                Err(Anomaly::EmptyResponse)
            }
            Err(err) => {
                warn!(kind = ?err.kind, error = %err, "transport error");
                Err(Anomaly::from_transport(&err))
            }
        }
    }
}

fn failure_report(
    request: &HttpRequest,
    response: Option<&HttpResponse>,
    envelope: Option<&ResponseEnvelope>,
) -> String {
    let http_status = response
        .map(|r| r.status)
        .filter(|s| *s != 0)
        .map(|s| s.to_string())
        .unwrap_or_else(|| crate::error::UNKNOWN.to_string());
    let ret = envelope
        .map(ResponseEnvelope::ret_label)
        .unwrap_or_else(|| crate::error::UNKNOWN.to_string());
    let status = envelope
        .map(ResponseEnvelope::status_label)
        .unwrap_or(crate::error::UNKNOWN);
    format!(
        "API request failed {} {} returned HTTP {} ret {} status {}",
        request.method, request.path, http_status, ret, status
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn request() -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: "http://api/group".to_string(),
            path: "/group".to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn report_names_everything() {
        let response = HttpResponse::new(200, r#"{"ret":4,"status":"Bad group"}"#);
        let envelope = ResponseEnvelope::from_response(&response);
        let msg = failure_report(&request(), Some(&response), envelope.as_ref());
        assert_eq!(msg, "API request failed GET /group returned HTTP 200 ret 4 status Bad group");
    }

    #[test]
    fn report_without_response_uses_unknown() {
        let msg = failure_report(&request(), None, None);
        assert_eq!(
            msg,
            "API request failed GET /group returned HTTP Unknown ret Unknown status Unknown"
        );
    }

    #[test]
    fn outcome_helpers() {
        let done: Outcome<u8> = Outcome::Completed(1);
        assert_eq!(done.clone().map(|v| v + 1), Outcome::Completed(2));
        assert_eq!(done.completed(), Some(1));
        let cancelled: Outcome<u8> = Outcome::Cancelled;
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.completed(), None);
    }
}
