use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";
pub const PASSWORD: &str = "secret";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub subject: String,
    pub by_moderator: bool,
}

#[derive(Deserialize)]
pub struct CreateMessage {
    pub subject: String,
    #[serde(default)]
    pub modtools: bool,
}

#[derive(Deserialize)]
pub struct MutateMessage {
    pub id: Uuid,
    pub subject: Option<String>,
}

#[derive(Deserialize)]
pub struct Login {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Default)]
pub struct AppState {
    pub messages: RwLock<HashMap<Uuid, Message>>,
    pub flaky_hits: AtomicU32,
}

pub type Db = Arc<AppState>;

type Reply = (StatusCode, Json<Value>);

/// An envelope: `ret`, `status`, then `extra`'s fields.
fn envelope(code: StatusCode, ret: i64, status: &str, extra: Value) -> Reply {
    let mut body = Map::new();
    body.insert("ret".to_string(), json!(ret));
    body.insert("status".to_string(), json!(status));
    if let Value::Object(fields) = extra {
        body.extend(fields);
    }
    (code, Json(Value::Object(body)))
}

fn success(extra: Value) -> Reply {
    envelope(StatusCode::OK, 0, "Success", extra)
}

pub fn app() -> Router {
    let db: Db = Arc::new(AppState::default());
    Router::new()
        .route("/session", get(session_status).post(login))
        .route("/maintenance", get(maintenance))
        .route("/duplicate", post(duplicate))
        .route("/empty", get(empty))
        .route("/broken", get(broken))
        .route("/flaky", get(flaky))
        .route("/echo", get(echo_query).post(echo_body))
        .route("/messages", get(list_messages).post(create_message))
        .route("/message", get(get_message).post(mutate_message))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn session_status() -> Reply {
    envelope(StatusCode::OK, 1, "Not logged in", json!({}))
}

async fn login(Json(input): Json<Login>) -> Reply {
    match (input.email, input.password.as_deref()) {
        (Some(email), Some(PASSWORD)) => {
            info!(%email, "login accepted");
            success(json!({ "persistent": { "email": email } }))
        }
        _ => envelope(StatusCode::OK, 2, "Invalid credentials", json!({})),
    }
}

async fn maintenance() -> Reply {
    envelope(StatusCode::SERVICE_UNAVAILABLE, 111, "Down for maintenance", json!({}))
}

async fn duplicate() -> Reply {
    envelope(StatusCode::OK, 999, "Duplicate", json!({}))
}

async fn empty() -> StatusCode {
    StatusCode::OK
}

async fn broken() -> Reply {
    envelope(StatusCode::INTERNAL_SERVER_ERROR, 5, "Database error", json!({}))
}

/// Empty body on the first hit, a normal envelope afterwards.
async fn flaky(State(db): State<Db>) -> Response {
    let hit = db.flaky_hits.fetch_add(1, Ordering::SeqCst);
    if hit == 0 {
        return StatusCode::OK.into_response();
    }
    success(json!({ "attempt": hit + 1 })).into_response()
}

async fn echo_query(Query(query): Query<HashMap<String, String>>) -> Reply {
    success(json!({ "query": query }))
}

async fn echo_body(headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let method = headers
        .get(METHOD_OVERRIDE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("POST")
        .to_string();
    success(json!({ "method": method, "body": body }))
}

async fn list_messages(State(db): State<Db>) -> Reply {
    let messages = db.messages.read().await;
    let list: Vec<Message> = messages.values().cloned().collect();
    success(json!({ "messages": list }))
}

async fn create_message(State(db): State<Db>, Json(input): Json<CreateMessage>) -> Reply {
    let message = Message {
        id: Uuid::new_v4(),
        subject: input.subject,
        by_moderator: input.modtools,
    };
    db.messages.write().await.insert(message.id, message.clone());
    info!(id = %message.id, "message created");
    success(json!({ "id": message.id }))
}

fn not_found() -> Reply {
    envelope(StatusCode::OK, 3, "Message not found", json!({}))
}

async fn get_message(
    State(db): State<Db>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    let Some(id) = query.get("id").and_then(|id| Uuid::parse_str(id).ok()) else {
        return envelope(StatusCode::OK, 4, "Invalid id", json!({}));
    };
    let messages = db.messages.read().await;
    match messages.get(&id) {
        Some(message) => success(json!({ "message": message })),
        None => not_found(),
    }
}

/// PATCH and DELETE arrive as POST with the override header.
async fn mutate_message(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<MutateMessage>,
) -> Reply {
    let verb = headers
        .get(METHOD_OVERRIDE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("POST");
    let mut messages = db.messages.write().await;
    match verb {
        "PATCH" => match messages.get_mut(&input.id) {
            Some(message) => {
                if let Some(subject) = input.subject {
                    message.subject = subject;
                }
                success(json!({ "message": message.clone() }))
            }
            None => not_found(),
        },
        "DELETE" => match messages.remove(&input.id) {
            Some(_) => success(json!({})),
            None => not_found(),
        },
        other => envelope(
            StatusCode::METHOD_NOT_ALLOWED,
            6,
            &format!("Unsupported method {other}"),
            json!({}),
        ),
    }
}
