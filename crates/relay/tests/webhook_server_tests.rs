//! Integration tests for the webhook HTTP server.
//!
//! Each test starts the real router on a random port and drives it with
//! signed requests, observing what reaches the notification relay.

use std::net::SocketAddr;
use std::time::Duration;

use notify::Embed;
use relay::{server, sign_payload, AppState, NotificationRelay};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const SECRET: &str = "integration-secret";

// =============================================================================
// Test Server
// =============================================================================

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// POST a body signed with `secret`.
    async fn deliver(&self, event: Option<&str>, body: &[u8], secret: &str) -> (u16, Value) {
        let mut request = self
            .client
            .post(self.url("/webhook"))
            .header("content-type", "application/json")
            .header("x-hub-signature-256", sign_payload(secret, body))
            .body(body.to_vec());
        if let Some(event) = event {
            request = request.header("x-github-event", event);
        }

        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn deliver_json(&self, event: &str, payload: &Value) -> (u16, Value) {
        let body = serde_json::to_vec(payload).unwrap();
        self.deliver(Some(event), &body, SECRET).await
    }
}

/// Start the server with an attached relay; returns the relay queue.
async fn start_server() -> (TestServer, mpsc::UnboundedReceiver<Embed>) {
    let relay = NotificationRelay::new();
    let rx = relay.attach();
    let server = start_server_with(relay).await;
    (server, rx)
}

async fn start_server_with(relay: NotificationRelay) -> TestServer {
    let state = AppState {
        webhook_secret: SECRET.to_string(),
        relay,
    };

    // Bind to random port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        server::serve(listener, state, std::future::pending())
            .await
            .unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        client: reqwest::Client::new(),
    }
}

fn push_payload() -> Value {
    json!({
        "ref": "refs/heads/main",
        "commits": [
            {"message": "Fix login\n\nDetails", "author": {"name": "Alice"}, "url": "https://x/1"},
            {"message": "Add tests", "author": {"name": "Bob"}, "url": "https://x/2"}
        ],
        "pusher": {"name": "alice"},
        "repository": {"name": "widgets"},
        "compare": "https://github.com/octo/widgets/compare/a...b"
    })
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (server, _rx) = start_server().await;

    let response = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok", "message": "Webhook server is running"}));
}

#[tokio::test]
async fn test_push_submits_notification() {
    let (server, mut rx) = start_server().await;

    let (status, body) = server.deliver_json("push", &push_payload()).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "success"}));

    let embed = rx.recv().await.unwrap();
    assert_eq!(embed.title, "New Commits to `main`");
    assert_eq!(embed.description.as_deref(), Some("**Fix login**"));
    assert_eq!(embed.field("Commits"), Some("2"));
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let (server, mut rx) = start_server().await;
    let body = serde_json::to_vec(&push_payload()).unwrap();

    let (status, reply) = server.deliver(Some("push"), &body, "not-the-secret").await;
    assert_eq!(status, 401);
    assert_eq!(reply, json!({"error": "Invalid signature"}));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized() {
    let (server, _rx) = start_server().await;

    let response = server
        .client
        .post(server.url("/webhook"))
        .header("x-github-event", "push")
        .json(&push_payload())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_signature_checked_before_event_header() {
    let (server, _rx) = start_server().await;

    // Bad signature and no event header: authentication wins
    let (status, _) = server.deliver(None, b"{}", "wrong").await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_missing_event_type() {
    let (server, _rx) = start_server().await;

    let body = serde_json::to_vec(&push_payload()).unwrap();
    let (status, reply) = server.deliver(None, &body, SECRET).await;
    assert_eq!(status, 400);
    assert_eq!(reply, json!({"error": "No event type"}));
}

#[tokio::test]
async fn test_missing_payload() {
    let (server, _rx) = start_server().await;

    for body in [&b""[..], b"null", b"{}", b"not json"] {
        let (status, reply) = server.deliver(Some("push"), body, SECRET).await;
        assert_eq!(status, 400, "body {:?}", String::from_utf8_lossy(body));
        assert_eq!(reply, json!({"error": "No payload"}));
    }
}

#[tokio::test]
async fn test_issue_deleted_is_success_without_notification() {
    let (server, mut rx) = start_server().await;

    let payload = json!({
        "action": "deleted",
        "issue": {
            "number": 7,
            "title": "Crash",
            "user": {"login": "dave"},
            "html_url": "https://github.com/octo/widgets/issues/7"
        }
    });
    let (status, body) = server.deliver_json("issues", &payload).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "success"}));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unhandled_event_is_success() {
    let (server, mut rx) = start_server().await;

    let (status, body) = server
        .deliver_json("star", &json!({"action": "created", "starred_at": "2024-01-01"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "success"}));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_replay_produces_two_notifications() {
    let (server, mut rx) = start_server().await;
    let body = serde_json::to_vec(&push_payload()).unwrap();

    let (first, _) = server.deliver(Some("push"), &body, SECRET).await;
    let (second, _) = server.deliver(Some("push"), &body, SECRET).await;
    assert_eq!((first, second), (200, 200));

    assert!(rx.recv().await.is_some());
    assert!(rx.recv().await.is_some());
}

#[tokio::test]
async fn test_missing_required_field_is_server_error() {
    let (server, mut rx) = start_server().await;

    let mut payload = push_payload();
    payload.as_object_mut().unwrap().remove("pusher");

    let (status, body) = server.deliver_json("push", &payload).await;
    assert_eq!(status, 500);
    assert_eq!(body, json!({"error": "Internal server error"}));
    assert!(rx.try_recv().is_err());

    // The server keeps serving afterwards
    let (status, _) = server.deliver_json("push", &push_payload()).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_detached_relay_still_returns_success() {
    let server = start_server_with(NotificationRelay::new()).await;

    let (status, body) = server.deliver_json("push", &push_payload()).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "success"}));
}

#[tokio::test]
async fn test_pull_request_merged_and_closed_differ() {
    let (server, mut rx) = start_server().await;

    let pr = |merged: bool| {
        let merged_by = if merged { json!({"login": "bob"}) } else { Value::Null };
        json!({
            "action": "closed",
            "pull_request": {
                "number": 3,
                "title": "Refactor",
                "user": {"login": "alice"},
                "head": {"ref": "refactor"},
                "base": {"ref": "main"},
                "html_url": "https://github.com/octo/widgets/pull/3",
                "merged": merged,
                "merged_by": merged_by
            }
        })
    };

    server.deliver_json("pull_request", &pr(true)).await;
    server.deliver_json("pull_request", &pr(false)).await;

    let merged = rx.recv().await.unwrap();
    let closed = rx.recv().await.unwrap();
    assert_eq!(merged.field("Status"), Some("Merged"));
    assert_eq!(closed.field("Status"), Some("Closed"));
    assert_ne!(merged.color, closed.color);
}
