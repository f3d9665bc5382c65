//! Push path
//!
//! - `GET /verify?token=..&challenge=..` echoes the challenge when the token
//!   matches, else 403. The Graph API spelling (`hub.verify_token`,
//!   `hub.challenge`) and the `/webhook` path are accepted too.
//! - `POST /events` validates the payload (Messenger, WhatsApp or a bare
//!   `{senderId, text}`), queues its messages and answers `{"status":"ok"}`
//!   without waiting for any run.
//! - `GET /health`, `GET /usage` for operators.

use super::{messenger, whatsapp, InboundEvent};
use crate::router::UsageLedger;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use sdk::EngineError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct WebhookState {
    verify_token: Option<Arc<str>>,
    allowed_senders: Arc<Vec<String>>,
    sink: mpsc::Sender<InboundEvent>,
    ledger: Arc<UsageLedger>,
    health: Arc<Value>,
}

impl WebhookState {
    /// `verify_token: None` rejects every handshake. An empty
    /// `allowed_senders` accepts everyone.
    pub fn new(
        verify_token: Option<String>,
        allowed_senders: Vec<String>,
        sink: mpsc::Sender<InboundEvent>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        Self {
            verify_token: verify_token.map(Arc::from),
            allowed_senders: Arc::new(allowed_senders),
            sink,
            ledger,
            health: Arc::new(json!({})),
        }
    }

    /// Extra fields reported by `/health`.
    pub fn with_health(mut self, info: Value) -> Self {
        self.health = Arc::new(info);
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct VerifyQuery {
    token: Option<String>,
    challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    hub_verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    hub_challenge: Option<String>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/verify", get(verify_handler))
        .route("/events", axum::routing::post(events_handler))
        .route("/webhook", get(verify_handler).post(events_handler))
        .route("/health", get(health_handler))
        .route("/usage", get(usage_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    bind: &str,
    state: WebhookState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), EngineError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| EngineError::Config(format!("cannot bind webhook server to {}: {}", bind, e)))?;
    info!("Webhook server listening on http://{}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Webhook server stopped");
    Ok(())
}

async fn verify_handler(
    State(state): State<WebhookState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let token = query.token.or(query.hub_verify_token);
    let challenge = query.challenge.or(query.hub_challenge);

    let matches = match (&state.verify_token, &token) {
        (Some(expected), Some(given)) => tokens_match(expected.as_bytes(), given.as_bytes()),
        _ => false,
    };

    match (matches, challenge) {
        (true, Some(challenge)) => {
            info!("Webhook verified");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            warn!("Webhook verification rejected");
            (StatusCode::FORBIDDEN, "Forbidden").into_response()
        }
    }
}

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(expected: &[u8], given: &[u8]) -> bool {
    expected.len() == given.len()
        && expected
            .iter()
            .zip(given)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

fn parse_payload(payload: &Value) -> Result<Vec<InboundEvent>, String> {
    match payload.get("object").and_then(Value::as_str) {
        Some(whatsapp::OBJECT) => whatsapp::parse_delivery(payload),
        _ => messenger::parse_delivery(payload),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn events_handler(State(state): State<WebhookState>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid JSON: {}", e)),
    };

    let events = match parse_payload(&payload) {
        Ok(events) => events,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    for event in events {
        if !state.allowed_senders.is_empty() && !state.allowed_senders.contains(&event.sender_id) {
            warn!(sender = %event.sender_id, "Ignoring event from unauthorized sender");
            continue;
        }
        match state.sink.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Dispatch queue full, asking sender to retry");
                return error_response(StatusCode::SERVICE_UNAVAILABLE, "queue full");
            }
            Err(TrySendError::Closed(_)) => {
                return error_response(StatusCode::SERVICE_UNAVAILABLE, "shutting down");
            }
        }
    }

    Json(json!({ "status": "ok" })).into_response()
}

async fn health_handler(State(state): State<WebhookState>) -> Json<Value> {
    let mut body = json!({
        "status": "healthy",
        "service": "crewline",
        "version": env!("CARGO_PKG_VERSION"),
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), state.health.as_object()) {
        body.extend(extra.clone());
    }
    Json(body)
}

async fn usage_handler(State(state): State<WebhookState>) -> Json<Value> {
    let report = state.ledger.report().await;
    let savings = report.savings();
    let savings_percent = report.savings_percent();
    let mut body = serde_json::to_value(&report).unwrap_or_else(|_| json!({}));
    body["savings"] = json!(savings);
    body["savingsPercent"] = json!(savings_percent);
    Json(body)
}
