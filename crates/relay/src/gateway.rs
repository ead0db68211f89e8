//! Discord gateway session.
//!
//! One call to [`run_session`] drives a single websocket session: Hello,
//! Identify, heartbeats, and dispatch forwarding. It returns when the session
//! ends for any reason; reconnecting is the caller's job.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Gateway opcodes used by the relay.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// `GUILDS | GUILD_MESSAGES`
pub const INTENTS: u64 = (1 << 0) | (1 << 9);

/// Activity type shown as "Watching ...".
const ACTIVITY_WATCHING: u8 = 3;

/// Interaction type for slash commands.
pub const APPLICATION_COMMAND: u8 = 2;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

/// Raw gateway frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadyApplication {
    pub id: String,
}

/// `READY` dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub user: GatewayUser,
    pub application: ReadyApplication,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuildMember {
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub user: Option<GatewayUser>,
}

/// One resolved option of a slash command invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOptionValue {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOptionValue>,
}

/// `INTERACTION_CREATE` dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub application_id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub token: String,
    #[serde(default)]
    pub data: Option<CommandData>,
    #[serde(default)]
    pub member: Option<GuildMember>,
    #[serde(default)]
    pub user: Option<GatewayUser>,
}

impl Interaction {
    fn invoker(&self) -> Option<&GatewayUser> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }

    /// Guild nickname, else global display name, else username.
    #[must_use]
    pub fn invoker_display_name(&self) -> String {
        let nick = self.member.as_ref().and_then(|m| m.nick.clone());
        nick.or_else(|| self.invoker().and_then(|u| u.global_name.clone()))
            .or_else(|| self.invoker().map(|u| u.username.clone()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Username of the invoker, for logs.
    #[must_use]
    pub fn invoker_name(&self) -> &str {
        self.invoker().map_or("unknown", |u| u.username.as_str())
    }
}

/// Dispatches forwarded to the chat loop.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Ready(Ready),
    InteractionCreate(Interaction),
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Server asked for a reconnect (op 7)
    Reconnect,
    /// Server invalidated the session (op 9)
    InvalidSession,
    /// Socket closed, with the close code when one was sent
    Closed(Option<u16>),
    /// No heartbeat ACK arrived before the next heartbeat was due
    MissedAck,
    /// The chat loop stopped listening
    ListenerGone,
}

/// Identify parameters.
#[derive(Debug, Clone)]
pub struct Identify {
    pub token: String,
    pub intents: u64,
    /// Shown as "Watching <activity>"
    pub activity: String,
}

impl Identify {
    fn payload(&self) -> Value {
        json!({
            "op": opcode::IDENTIFY,
            "d": {
                "token": self.token,
                "intents": self.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "repo-relay",
                    "device": "repo-relay"
                },
                "presence": {
                    "activities": [{ "name": self.activity, "type": ACTIVITY_WATCHING }],
                    "status": "online",
                    "since": null,
                    "afk": false
                }
            }
        })
    }
}

fn heartbeat(sequence: Option<u64>) -> Message {
    Message::text(json!({ "op": opcode::HEARTBEAT, "d": sequence }).to_string())
}

/// Turn a dispatch frame into an event for the chat loop. Unknown dispatches
/// and non-command interactions yield `None`.
fn parse_dispatch(event_name: &str, data: Value) -> Result<Option<GatewayEvent>, GatewayError> {
    match event_name {
        "READY" => Ok(Some(GatewayEvent::Ready(serde_json::from_value(data)?))),
        "INTERACTION_CREATE" => {
            let interaction: Interaction = serde_json::from_value(data)?;
            if interaction.kind == APPLICATION_COMMAND {
                Ok(Some(GatewayEvent::InteractionCreate(interaction)))
            } else {
                debug!(kind = interaction.kind, "Ignoring non-command interaction");
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

/// Run one gateway session against `url`, forwarding dispatches to `events`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established, the handshake
/// is malformed, or the socket fails mid-session.
pub async fn run_session(
    url: &str,
    identify: &Identify,
    events: &mpsc::UnboundedSender<GatewayEvent>,
) -> Result<SessionEnd, GatewayError> {
    info!(url = url.split('?').next().unwrap_or(url), "Connecting to gateway");
    let (ws_stream, _) = connect_async(url).await?;
    let (mut write, mut read) = ws_stream.split();

    // Hello must be the first frame
    let hello = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: GatewayPayload = serde_json::from_str(&text)?;
                if frame.op != opcode::HELLO {
                    return Err(GatewayError::Protocol(format!(
                        "expected Hello, got op {}",
                        frame.op
                    )));
                }
                break serde_json::from_value::<Hello>(frame.d)?;
            }
            Some(Ok(Message::Close(frame))) => {
                return Ok(SessionEnd::Closed(frame.map(|f| u16::from(f.code))));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(SessionEnd::Closed(None)),
        }
    };

    if hello.heartbeat_interval == 0 {
        return Err(GatewayError::Protocol(
            "Hello carried a zero heartbeat interval".to_string(),
        ));
    }
    let period = Duration::from_millis(hello.heartbeat_interval);
    debug!(interval_ms = hello.heartbeat_interval, "Gateway hello");

    write
        .send(Message::text(identify.payload().to_string()))
        .await?;

    let mut heartbeats = interval_at(Instant::now() + period, period);
    heartbeats.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence: Option<u64> = None;
    let mut awaiting_ack = false;

    loop {
        tokio::select! {
            _ = heartbeats.tick() => {
                if awaiting_ack {
                    warn!("Heartbeat not acknowledged, ending session");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::MissedAck);
                }
                write.send(heartbeat(sequence)).await?;
                awaiting_ack = true;
            }

            msg = read.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "Failed to send pong");
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        info!(?code, "Gateway closed connection");
                        return Ok(SessionEnd::Closed(code));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(SessionEnd::Closed(None)),
                };

                let frame: GatewayPayload = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "Failed to parse gateway frame");
                        continue;
                    }
                };
                if frame.s.is_some() {
                    sequence = frame.s;
                }

                match frame.op {
                    opcode::DISPATCH => {
                        let name = frame.t.unwrap_or_default();
                        match parse_dispatch(&name, frame.d) {
                            Ok(Some(event)) => {
                                if events.send(event).is_err() {
                                    return Ok(SessionEnd::ListenerGone);
                                }
                            }
                            Ok(None) => {}
                            Err(e) => error!(event = %name, error = %e, "Malformed dispatch"),
                        }
                    }
                    opcode::HEARTBEAT => write.send(heartbeat(sequence)).await?,
                    opcode::HEARTBEAT_ACK => awaiting_ack = false,
                    opcode::RECONNECT => {
                        info!("Gateway requested reconnect");
                        return Ok(SessionEnd::Reconnect);
                    }
                    opcode::INVALID_SESSION => {
                        warn!("Gateway invalidated session");
                        return Ok(SessionEnd::InvalidSession);
                    }
                    other => debug!(op = other, "Ignoring gateway op"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn text(value: &Value) -> Message {
        Message::text(value.to_string())
    }

    /// Accept one gateway client and hand the socket to `script`.
    async fn fake_gateway<F, Fut>(script: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            script(ws).await;
        });
        format!("ws://{addr}")
    }

    fn identify() -> Identify {
        Identify {
            token: "bot-token".to_string(),
            intents: INTENTS,
            activity: "octo/widgets".to_string(),
        }
    }

    #[test]
    fn test_intents() {
        assert_eq!(INTENTS, 513);
    }

    #[test]
    fn test_identify_payload() {
        let payload = identify().payload();
        assert_eq!(payload["op"], 2);
        assert_eq!(payload["d"]["token"], "bot-token");
        assert_eq!(payload["d"]["intents"], 513);
        assert_eq!(payload["d"]["presence"]["activities"][0]["name"], "octo/widgets");
        assert_eq!(payload["d"]["presence"]["activities"][0]["type"], 3);
    }

    #[test]
    fn test_display_name_preference() {
        let mut interaction: Interaction = serde_json::from_value(json!({
            "id": "1",
            "application_id": "2",
            "type": 2,
            "token": "tok",
            "member": {
                "nick": "Ally",
                "user": {"id": "10", "username": "alice", "global_name": "Alice A."}
            }
        }))
        .unwrap();
        assert_eq!(interaction.invoker_display_name(), "Ally");
        assert_eq!(interaction.invoker_name(), "alice");

        interaction.member.as_mut().unwrap().nick = None;
        assert_eq!(interaction.invoker_display_name(), "Alice A.");

        interaction.member = None;
        interaction.user = Some(GatewayUser {
            id: "10".to_string(),
            username: "alice".to_string(),
            global_name: None,
        });
        assert_eq!(interaction.invoker_display_name(), "alice");
    }

    #[test]
    fn test_parse_dispatch_filters_interactions() {
        let autocomplete = json!({"id": "1", "application_id": "2", "type": 4, "token": "t"});
        assert!(parse_dispatch("INTERACTION_CREATE", autocomplete).unwrap().is_none());
        assert!(parse_dispatch("MESSAGE_CREATE", json!({})).unwrap().is_none());
        assert!(parse_dispatch("READY", json!({})).is_err());
    }

    #[tokio::test]
    async fn test_session_identifies_and_forwards_dispatches() {
        let url = fake_gateway(|mut ws| async move {
            ws.send(text(&json!({"op": 10, "d": {"heartbeat_interval": 45000}})))
                .await
                .unwrap();

            let identify = ws.next().await.unwrap().unwrap();
            let identify: Value = serde_json::from_str(identify.to_text().unwrap()).unwrap();
            assert_eq!(identify["op"], 2);
            assert_eq!(identify["d"]["intents"], 513);

            ws.send(text(&json!({
                "op": 0, "s": 1, "t": "READY",
                "d": {
                    "user": {"id": "99", "username": "relay-bot"},
                    "application": {"id": "555"},
                    "session_id": "abc"
                }
            })))
            .await
            .unwrap();

            ws.send(text(&json!({
                "op": 0, "s": 2, "t": "INTERACTION_CREATE",
                "d": {
                    "id": "777",
                    "application_id": "555",
                    "type": 2,
                    "token": "itoken",
                    "data": {"name": "pr", "options": [{"name": "number", "type": 4, "value": 42}]}
                }
            })))
            .await
            .unwrap();

            ws.send(text(&json!({"op": 7, "d": null}))).await.unwrap();
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let end = run_session(&url, &identify(), &tx).await.unwrap();
        assert_eq!(end, SessionEnd::Reconnect);

        match rx.recv().await.unwrap() {
            GatewayEvent::Ready(ready) => {
                assert_eq!(ready.application.id, "555");
                assert_eq!(ready.user.username, "relay-bot");
            }
            other => panic!("unexpected {other:?}"),
        }
        match rx.recv().await.unwrap() {
            GatewayEvent::InteractionCreate(interaction) => {
                assert_eq!(interaction.id, "777");
                let data = interaction.data.unwrap();
                assert_eq!(data.name, "pr");
                assert_eq!(data.options[0].value, 42);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_heartbeat_request_answered_with_sequence() {
        let url = fake_gateway(|mut ws| async move {
            ws.send(text(&json!({"op": 10, "d": {"heartbeat_interval": 45000}})))
                .await
                .unwrap();
            let _identify = ws.next().await.unwrap().unwrap();

            ws.send(text(&json!({"op": 0, "s": 5, "t": "GUILD_CREATE", "d": {}})))
                .await
                .unwrap();
            ws.send(text(&json!({"op": 1, "d": null}))).await.unwrap();

            let beat = ws.next().await.unwrap().unwrap();
            let beat: Value = serde_json::from_str(beat.to_text().unwrap()).unwrap();
            assert_eq!(beat, json!({"op": 1, "d": 5}));

            ws.send(text(&json!({"op": 9, "d": false}))).await.unwrap();
        })
        .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let end = run_session(&url, &identify(), &tx).await.unwrap();
        assert_eq!(end, SessionEnd::InvalidSession);
    }

    #[tokio::test]
    async fn test_missed_ack_ends_session() {
        let url = fake_gateway(|mut ws| async move {
            ws.send(text(&json!({"op": 10, "d": {"heartbeat_interval": 50}})))
                .await
                .unwrap();
            // Read everything, never acknowledge
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let end = run_session(&url, &identify(), &tx).await.unwrap();
        assert_eq!(end, SessionEnd::MissedAck);
    }

    #[tokio::test]
    async fn test_close_frame_ends_session() {
        let url = fake_gateway(|mut ws| async move {
            ws.send(text(&json!({"op": 10, "d": {"heartbeat_interval": 45000}})))
                .await
                .unwrap();
            let _identify = ws.next().await.unwrap().unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let end = run_session(&url, &identify(), &tx).await.unwrap();
        assert!(matches!(end, SessionEnd::Closed(_)));
    }

    #[tokio::test]
    async fn test_non_hello_first_frame_is_protocol_error() {
        let url = fake_gateway(|mut ws| async move {
            ws.send(text(&json!({"op": 11}))).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = run_session(&url, &identify(), &tx).await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_zero_heartbeat_interval_is_protocol_error() {
        let url = fake_gateway(|mut ws| async move {
            ws.send(text(&json!({"op": 10, "d": {"heartbeat_interval": 0}})))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = run_session(&url, &identify(), &tx).await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }
}
