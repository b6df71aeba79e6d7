//! Dispatcher behaviour against a scripted transport.
//!
//! # Design
//! `ScriptedTransport` replays a queue of canned results and records every
//! request it sees along with the (paused) tokio clock, so retry counts and
//! the delay between attempts can be asserted exactly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use iznik_core::{
    ApiClient, ApiError, ClientConfig, HttpMethod, HttpRequest, HttpResponse, LogDecision,
    Outcome, RequestSpec, RestorableSession, StaticSession, TelemetryReporter, Transport,
    TransportError, TransportErrorKind, METHOD_OVERRIDE_HEADER,
};
use serde_json::json;
use tokio::time::Instant;

type Scripted = Result<HttpResponse, TransportError>;

#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    sent: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<(Instant, HttpRequest)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.sent.lock().unwrap().push((Instant::now(), request.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport called more often than scripted")
    }
}

#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<String>>,
}

impl RecordingReporter {
    fn reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }
}

impl TelemetryReporter for RecordingReporter {
    fn report(&self, message: &str) {
        self.reports.lock().unwrap().push(message.to_string());
    }
}

struct Harness {
    client: ApiClient,
    transport: Arc<ScriptedTransport>,
    telemetry: Arc<RecordingReporter>,
}

fn harness_with_session(
    script: Vec<Scripted>,
    session: Arc<dyn iznik_core::SessionContext>,
) -> Harness {
    let transport = ScriptedTransport::new(script);
    let telemetry = Arc::new(RecordingReporter::default());
    let client = ApiClient::new(
        ClientConfig::new("http://api.test/api"),
        transport.clone(),
        session,
        telemetry.clone(),
    );
    Harness {
        client,
        transport,
        telemetry,
    }
}

fn harness(script: Vec<Scripted>) -> Harness {
    harness_with_session(script, Arc::new(StaticSession::new()))
}

fn ok(status: u16, body: &str) -> Scripted {
    Ok(HttpResponse::new(status, body))
}

fn fail(kind: TransportErrorKind, message: &str) -> Scripted {
    Err(TransportError::new(kind, message))
}

// ---------------------------------------------------------------------------
// Success paths
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn ret_zero_returns_payload_unchanged() {
    let h = harness(vec![ok(
        200,
        r#"{"ret":0,"status":"Success","group":{"id":7,"nameshort":"Town"}}"#,
    )]);

    let env = h
        .client
        .get("/group", vec![("id".into(), "7".into())], true)
        .await
        .unwrap()
        .completed()
        .unwrap();

    assert_eq!(env.ret, Some(0));
    assert_eq!(env.payload["group"], json!({ "id": 7, "nameshort": "Town" }));
    assert!(h.telemetry.reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn not_logged_in_resolves() {
    let h = harness(vec![ok(200, r#"{"ret":1,"status":"Not logged in"}"#)]);
    let env = h.client.get("/session", Vec::new(), true).await.unwrap().completed().unwrap();
    assert!(env.is_not_logged_in());
}

#[tokio::test(start_paused = true)]
async fn duplicate_submission_resolves_whatever_the_status_text() {
    let h = harness(vec![ok(200, r#"{"ret":999,"status":"Something odd"}"#)]);
    let outcome = h.client.post("/message", json!({ "subject": "Offer" }), true).await.unwrap();
    assert_eq!(outcome.completed().unwrap().ret, Some(999));
}

#[tokio::test(start_paused = true)]
async fn session_post_may_return_any_ret() {
    let h = harness(vec![ok(200, r#"{"ret":2,"status":"Invalid credentials"}"#)]);
    let env = h
        .client
        .post("/session", json!({ "email": "a@b.c", "password": "x" }), true)
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(env.ret, Some(2));
}

// ---------------------------------------------------------------------------
// Hard errors and telemetry
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn maintenance_is_never_reported() {
    let h = harness(vec![ok(503, r#"{"ret":111,"status":"Down for maintenance"}"#)]);
    let err = h.client.get("/group", Vec::new(), true).await.unwrap_err();
    assert!(err.is_maintenance());
    assert!(h.telemetry.reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn other_ret_is_rejected_and_reported() {
    let h = harness(vec![ok(200, r#"{"ret":3,"status":"Message not found"}"#)]);
    let err = h.client.get("/message", Vec::new(), true).await.unwrap_err();

    match &err {
        ApiError::Rejected { ret, status, context } => {
            assert_eq!(*ret, Some(3));
            assert_eq!(status.as_deref(), Some("Message not found"));
            assert_eq!(context.request.path, "/message");
            assert_eq!(context.request.method, HttpMethod::Get);
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    let reports = h.telemetry.reports();
    assert_eq!(reports.len(), 1);
    for needle in ["/message", "GET", "ret 3", "status Message not found", "HTTP 200"] {
        assert!(reports[0].contains(needle), "{needle} missing from {}", reports[0]);
    }
}

#[tokio::test(start_paused = true)]
async fn non_200_is_rejected_even_with_ret_zero() {
    let h = harness(vec![ok(500, r#"{"ret":0,"status":"Success"}"#)]);
    let err = h.client.get("/group", Vec::new(), true).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { ret: Some(0), .. }));
    assert_eq!(err.context().unwrap().response.http_status, Some(500));
}

#[tokio::test(start_paused = true)]
async fn log_false_suppresses_report_but_still_fails() {
    let h = harness(vec![ok(404, r#"{"ret":404,"status":"Not found"}"#)]);
    let err = h.client.get("/probe", Vec::new(), false).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { .. }));
    assert!(h.telemetry.reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn log_predicate_is_evaluated_against_envelope() {
    let expected_failure = LogDecision::when(|env| env.and_then(|e| e.ret) != Some(3));

    let h = harness(vec![
        ok(200, r#"{"ret":3,"status":"Expected"}"#),
        ok(200, r#"{"ret":4,"status":"Unexpected"}"#),
    ]);

    let err = h.client.get("/a", Vec::new(), expected_failure.clone()).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { ret: Some(3), .. }));
    assert!(h.telemetry.reports().is_empty());

    let err = h.client.get("/b", Vec::new(), expected_failure).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { ret: Some(4), .. }));
    let reports = h.telemetry.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("/b"));
    assert!(reports[0].contains("ret 4"));
    assert!(reports[0].contains("status Unexpected"));
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn timeout_retries_once_after_two_seconds() {
    let h = harness(vec![
        fail(TransportErrorKind::Opaque, "Error: timeout of 0ms exceeded"),
        ok(200, r#"{"ret":0,"status":"Success"}"#),
    ]);

    let outcome = h.client.get("/group", Vec::new(), true).await.unwrap();
    assert!(matches!(outcome, Outcome::Completed(_)));

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].0 - sent[0].0 >= Duration::from_secs(2));
    assert_eq!(sent[0].1, sent[1].1, "retry must resend the identical request");
}

#[tokio::test(start_paused = true)]
async fn second_timeout_propagates() {
    let h = harness(vec![
        fail(TransportErrorKind::Timeout, "timed out"),
        fail(TransportErrorKind::Timeout, "timed out again"),
    ]);

    let err = h.client.get("/group", Vec::new(), true).await.unwrap_err();
    match err {
        ApiError::Transport(e) => assert_eq!(e.message, "timed out again"),
        other => panic!("expected Transport, got {other:?}"),
    }
    assert_eq!(h.transport.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn network_error_message_retries() {
    let h = harness(vec![
        fail(TransportErrorKind::Opaque, "Network Error"),
        ok(200, r#"{"ret":0}"#),
    ]);
    assert!(h.client.get("/group", Vec::new(), true).await.is_ok());
    assert_eq!(h.transport.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn os_connection_abort_is_retried_not_cancelled() {
    let abort = ureq::Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionAborted,
        "Software caused connection abort (os error 103)",
    ));
    let h = harness(vec![
        Err(TransportError::from(abort)),
        ok(200, r#"{"ret":0,"status":"Success"}"#),
    ]);

    let outcome = h.client.get("/group", Vec::new(), true).await.unwrap();
    assert!(matches!(outcome, Outcome::Completed(_)));
    assert_eq!(h.transport.sent().len(), 2);
    assert!(h.telemetry.reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn os_connection_abort_twice_surfaces_as_transport_error() {
    let abort = || {
        Err(TransportError::from(ureq::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "connection abort",
        ))))
    };
    let h = harness(vec![abort(), abort()]);

    let err = h.client.get("/group", Vec::new(), true).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Transport(TransportError { kind: TransportErrorKind::Network, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn empty_response_retries_once() {
    let h = harness(vec![ok(200, ""), ok(200, r#"{"ret":0,"status":"Success"}"#)]);
    assert!(h.client.get("/group", Vec::new(), true).await.is_ok());
    assert_eq!(h.transport.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn empty_response_twice_is_rejected_as_unknown() {
    let h = harness(vec![ok(200, "{}"), ok(200, "{}")]);
    let err = h.client.get("/group", Vec::new(), true).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { ret: None, status: None, .. }));
    assert_eq!(h.transport.sent().len(), 2);
    assert_eq!(h.telemetry.reports().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn aborted_resolves_as_cancelled_without_noise() {
    let h = harness(vec![fail(TransportErrorKind::Opaque, "Request aborted")]);
    let outcome = h.client.get("/group", Vec::new(), true).await.unwrap();
    assert!(outcome.is_cancelled());
    assert_eq!(h.transport.sent().len(), 1);
    assert!(h.telemetry.reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unclassified_anomaly_falls_through_to_validation() {
    let h = harness(vec![fail(TransportErrorKind::Opaque, "certificate has expired")]);
    let err = h.client.get("/group", Vec::new(), true).await.unwrap_err();

    match &err {
        ApiError::Rejected { ret, status, context } => {
            assert_eq!(*ret, None);
            assert_eq!(*status, None);
            assert_eq!(context.response.http_status, None);
            assert!(context.response.envelope.is_none());
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert_eq!(h.transport.sent().len(), 1);
    assert_eq!(
        h.telemetry.reports(),
        vec![
            "API request failed GET /group returned HTTP Unknown ret Unknown status Unknown"
                .to_string()
        ]
    );
}

// ---------------------------------------------------------------------------
// Request shaping through the dispatcher
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn tunnelled_verbs_are_sent_as_post() {
    let h = harness(vec![
        ok(200, r#"{"ret":0}"#),
        ok(200, r#"{"ret":0}"#),
        ok(200, r#"{"ret":0}"#),
    ]);

    h.client.put("/message", json!({ "id": 1 }), true).await.unwrap();
    h.client.patch("/message", json!({ "id": 1 }), true).await.unwrap();
    h.client.delete("/message", json!({ "id": 1 }), true).await.unwrap();

    let verbs: Vec<_> = h
        .transport
        .sent()
        .into_iter()
        .map(|(_, req)| {
            assert_eq!(req.method, HttpMethod::Post);
            req.header(METHOD_OVERRIDE_HEADER).unwrap().to_string()
        })
        .collect();
    assert_eq!(verbs, vec!["PUT", "PATCH", "DELETE"]);
}

#[tokio::test(start_paused = true)]
async fn operator_flag_comes_from_session() {
    let session = Arc::new(StaticSession::new().with_flag("modtools", true));
    let h = harness_with_session(vec![ok(200, r#"{"ret":0}"#), ok(200, r#"{"ret":0}"#)], session);

    h.client.get("/groups", Vec::new(), true).await.unwrap();
    h.client.post("/message", json!({ "subject": "x" }), true).await.unwrap();

    let sent = h.transport.sent();
    assert_eq!(sent[0].1.url, "http://api.test/api/groups");
    assert!(sent[0].1.query.contains(&("modtools".to_string(), "true".to_string())));
    let body: serde_json::Value = serde_json::from_str(sent[1].1.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({ "subject": "x", "modtools": true }));
}

#[tokio::test(start_paused = true)]
async fn dispatch_waits_for_session_restore() {
    let session = Arc::new(RestorableSession::new());
    let h = harness_with_session(vec![ok(200, r#"{"ret":0}"#)], session.clone());

    let client = h.client.clone();
    let pending =
        tokio::spawn(async move { client.dispatch(RequestSpec::get("/user"), true).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.transport.sent().is_empty(), "sent before the session was restored");

    session.set_flag("modtools", true);
    session.mark_restored();
    let outcome = pending.await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::Completed(_)));

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.query.contains(&("modtools".to_string(), "true".to_string())));
}
