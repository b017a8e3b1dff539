//! Discord gateway session: hello, identify, heartbeats and message dispatch.

use futures_util::{SinkExt, StreamExt};
use memebot_core::{CoreError, DiscordError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_MESSAGES: u64 = 1 << 9;
    pub const DIRECT_MESSAGES: u64 = 1 << 12;
    pub const MESSAGE_CONTENT: u64 = 1 << 15;
}

/// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT = 37377
pub const DEFAULT_INTENTS: u64 =
    intents::GUILDS | intents::GUILD_MESSAGES | intents::DIRECT_MESSAGES | intents::MESSAGE_CONTENT;

pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 41250;

mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// A chat message as the dispatcher sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel_id: String,
    pub author_id: String,
    pub author_is_bot: bool,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Hello { heartbeat_interval: u64 },
    HeartbeatRequest,
    HeartbeatAck,
    Reconnect,
    InvalidSession,
    Ready { user_id: String },
    Message(InboundMessage),
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub sequence: Option<i64>,
    pub event: GatewayEvent,
}

#[derive(Deserialize)]
struct RawPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<i64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Deserialize)]
struct RawAuthor {
    id: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct RawMessage {
    channel_id: String,
    author: RawAuthor,
    #[serde(default)]
    content: String,
}

pub fn parse_frame(raw: &str) -> Result<Frame, DiscordError> {
    let payload: RawPayload =
        serde_json::from_str(raw).map_err(|e| DiscordError::InvalidPayload {
            details: e.to_string(),
        })?;

    let event = match payload.op {
        opcode::HELLO => GatewayEvent::Hello {
            heartbeat_interval: payload
                .d
                .get("heartbeat_interval")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS),
        },
        opcode::HEARTBEAT => GatewayEvent::HeartbeatRequest,
        opcode::HEARTBEAT_ACK => GatewayEvent::HeartbeatAck,
        opcode::RECONNECT => GatewayEvent::Reconnect,
        opcode::INVALID_SESSION => GatewayEvent::InvalidSession,
        opcode::DISPATCH => parse_dispatch(payload.t.as_deref().unwrap_or(""), payload.d)?,
        _ => GatewayEvent::Ignored,
    };

    Ok(Frame {
        sequence: payload.s,
        event,
    })
}

fn parse_dispatch(event_type: &str, data: Value) -> Result<GatewayEvent, DiscordError> {
    match event_type {
        "READY" => {
            let user_id = data
                .get("user")
                .and_then(|u| u.get("id"))
                .and_then(Value::as_str)
                .ok_or_else(|| DiscordError::InvalidPayload {
                    details: "READY without user id".to_string(),
                })?;
            Ok(GatewayEvent::Ready {
                user_id: user_id.to_string(),
            })
        }
        "MESSAGE_CREATE" => {
            let message: RawMessage =
                serde_json::from_value(data).map_err(|e| DiscordError::InvalidPayload {
                    details: format!("MESSAGE_CREATE: {}", e),
                })?;
            Ok(GatewayEvent::Message(InboundMessage {
                channel_id: message.channel_id,
                author_id: message.author.id,
                author_is_bot: message.author.bot,
                content: message.content,
            }))
        }
        _ => Ok(GatewayEvent::Ignored),
    }
}

fn heartbeat_payload(sequence: Option<i64>) -> String {
    json!({ "op": opcode::HEARTBEAT, "d": sequence }).to_string()
}

fn identify_payload(token: &str, intents: u64) -> String {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "memebot",
                "device": "memebot"
            }
        }
    })
    .to_string()
}

fn connection_error(e: impl std::fmt::Display) -> CoreError {
    DiscordError::GatewayConnection {
        reason: e.to_string(),
    }
    .into()
}

/// Tracks whether the last heartbeat was acknowledged. A tick that finds
/// the previous heartbeat still unacknowledged means the connection is dead.
#[derive(Debug, Default)]
struct HeartbeatMonitor {
    awaiting_ack: bool,
}

impl HeartbeatMonitor {
    /// Returns `false` when the connection should be dropped instead of
    /// sending another heartbeat.
    fn on_tick(&mut self) -> bool {
        if self.awaiting_ack {
            return false;
        }
        self.awaiting_ack = true;
        true
    }

    fn on_ack(&mut self) {
        self.awaiting_ack = false;
    }
}

pub struct Gateway {
    bot_token: String,
    intents: u64,
}

impl Gateway {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            intents: DEFAULT_INTENTS,
        }
    }

    /// Runs one gateway session, forwarding user messages to `tx`.
    ///
    /// Returns `Ok` when the session ends in a way that warrants reconnecting
    /// (reconnect request, invalid session, socket closed) or when `tx` has
    /// no receiver left.
    pub async fn run(&self, url: &str, tx: &mpsc::Sender<InboundMessage>) -> Result<(), CoreError> {
        let ws_url = format!("{}/?v=10&encoding=json", url.trim_end_matches('/'));
        info!("Connecting to Discord gateway");

        let (stream, _) = tokio_tungstenite::connect_async(ws_url.as_str())
            .await
            .map_err(connection_error)?;
        let (mut write, mut read) = stream.split();

        let hello = match read.next().await {
            Some(Ok(Message::Text(text))) => parse_frame(text.as_str())?,
            Some(Ok(other)) => {
                return Err(DiscordError::InvalidPayload {
                    details: format!("expected hello, got {:?}", other),
                }
                .into())
            }
            Some(Err(e)) => return Err(connection_error(e)),
            None => return Err(connection_error("socket closed before hello")),
        };
        let GatewayEvent::Hello { heartbeat_interval } = hello.event else {
            return Err(DiscordError::InvalidPayload {
                details: format!("expected hello, got {:?}", hello.event),
            }
            .into());
        };

        write
            .send(Message::Text(identify_payload(&self.bot_token, self.intents).into()))
            .await
            .map_err(connection_error)?;
        info!("Identified with Discord gateway");

        let period = Duration::from_millis(heartbeat_interval);
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut monitor = HeartbeatMonitor::default();
        let mut sequence: Option<i64> = None;
        let mut own_id: Option<String> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if !monitor.on_tick() {
                        warn!("No heartbeat ACK from Discord gateway since the last heartbeat");
                        return Ok(());
                    }
                    write
                        .send(Message::Text(heartbeat_payload(sequence).into()))
                        .await
                        .map_err(connection_error)?;
                }
                message = read.next() => {
                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| format!("{} {}", u16::from(f.code), &*f.reason))
                                .unwrap_or_default();
                            warn!("Discord gateway closed the socket: {}", reason);
                            return Ok(());
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(connection_error(e)),
                        None => {
                            warn!("Discord gateway stream ended");
                            return Ok(());
                        }
                    };

                    let frame = match parse_frame(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!("Skipping gateway payload: {}", e);
                            continue;
                        }
                    };
                    if frame.sequence.is_some() {
                        sequence = frame.sequence;
                    }

                    match frame.event {
                        GatewayEvent::HeartbeatRequest => {
                            write
                                .send(Message::Text(heartbeat_payload(sequence).into()))
                                .await
                                .map_err(connection_error)?;
                        }
                        GatewayEvent::Reconnect => {
                            info!("Discord gateway requested reconnect");
                            return Ok(());
                        }
                        GatewayEvent::InvalidSession => {
                            warn!("Discord gateway invalidated the session");
                            return Ok(());
                        }
                        GatewayEvent::Ready { user_id } => {
                            info!("Discord session ready as user {}", user_id);
                            own_id = Some(user_id);
                        }
                        GatewayEvent::Message(message) => {
                            if message.author_is_bot || own_id.as_deref() == Some(message.author_id.as_str()) {
                                continue;
                            }
                            if tx.send(message).await.is_err() {
                                return Ok(());
                            }
                        }
                        GatewayEvent::HeartbeatAck => monitor.on_ack(),
                        GatewayEvent::Hello { .. } | GatewayEvent::Ignored => {}
                    }
                }
            }
        }
    }
}
