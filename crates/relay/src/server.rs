//! HTTP server receiving GitHub webhooks.

use std::future::Future;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::events::{classify, Classification, PayloadError};
use crate::formatters::format_event;
use crate::relay::{NotificationRelay, Submission};
use crate::webhooks::{verify_webhook_signature, WebhookHeaders};

/// GitHub caps webhook deliveries at 25 MB.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Webhook signing secret.
    pub webhook_secret: String,
    /// Hand-off to the chat loop.
    pub relay: NotificationRelay,
}

/// Build the HTTP router for the relay.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Webhook server listening");
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Webhook server is running" }))
}

fn reply(status: StatusCode, body: Value) -> (StatusCode, Json<Value>) {
    (status, Json(body))
}

/// Handle a GitHub webhook delivery.
///
/// Order matters: the signature is checked against the raw bytes before
/// anything else is read.
async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let webhook = WebhookHeaders::from_header_map(|name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    });

    let Some(signature) = webhook.signature.as_deref() else {
        warn!("No signature provided in webhook request");
        return reply(StatusCode::UNAUTHORIZED, json!({ "error": "Invalid signature" }));
    };

    if !verify_webhook_signature(&body, signature, &state.webhook_secret) {
        warn!(delivery_id = ?webhook.delivery_id, "Webhook signature verification failed");
        return reply(StatusCode::UNAUTHORIZED, json!({ "error": "Invalid signature" }));
    }

    let Some(event_type) = webhook.event_type.as_deref() else {
        error!("No event type in webhook request");
        return reply(StatusCode::BAD_REQUEST, json!({ "error": "No event type" }));
    };

    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) if !is_blank(&payload) => payload,
        Ok(_) | Err(_) => {
            error!(event_type, "No payload in webhook request");
            return reply(StatusCode::BAD_REQUEST, json!({ "error": "No payload" }));
        }
    };

    info!(event_type, delivery_id = ?webhook.delivery_id, "Received event from GitHub");

    match process_event(&state.relay, event_type, &payload) {
        Ok(()) => reply(StatusCode::OK, json!({ "status": "success" })),
        Err(e) => {
            error!(event_type, error = %e, "Error processing webhook");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            )
        }
    }
}

/// Classify, format and hand off. Delivery itself happens on the chat loop.
fn process_event(
    relay: &NotificationRelay,
    event_type: &str,
    payload: &Value,
) -> Result<(), PayloadError> {
    match classify(event_type, payload)? {
        Classification::Notify(event) => {
            let embed = format_event(&event, Utc::now());
            let title = embed.title.clone();
            match relay.submit(embed) {
                Submission::Submitted => info!(event_type, %title, "Notification submitted"),
                Submission::Dropped => warn!(event_type, %title, "Notification dropped"),
            }
        }
        Classification::Ignore(reason) => info!(event_type, %reason, "No notification for event"),
    }
    Ok(())
}

/// Payloads treated as absent: `null`, `false`, `0`, `""`, `[]` and `{}`.
fn is_blank(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
