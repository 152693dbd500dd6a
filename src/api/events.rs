//! Inbound channel events and the Engine.IO / Socket.IO text framing they
//! arrive in.
//!
//! Only the slice of the framing a listening client needs is handled: the
//! handshake, heartbeats, connect/disconnect of the default namespace and
//! plain (non-binary) events.

use crate::api::models::Message;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EVENT_ONLINE_USERS: &str = "getOnlineUsers";
pub const EVENT_NEW_MESSAGE: &str = "newMessage";
pub const EVENT_MESSAGE_SENT: &str = "messageSent";
pub const EVENT_MESSAGE_DELETED: &str = "messageDeleted";

/// A named event with its raw payload, as pulled off the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub event_type: String,
    pub data: Value,
}

/// Typed events the stores react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Full list of online user ids, replaces the previous one.
    OnlineUsers(Vec<String>),
    /// Someone sent us a message.
    NewMessage(Message),
    /// Echo of a message we sent, possibly ahead of the HTTP response.
    MessageSent(Message),
    MessageDeleted { message_id: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedPayload {
    message_id: String,
}

impl ChannelEvent {
    /// Interpret a raw event. Unknown event names yield `Ok(None)`.
    pub fn from_incoming(ev: IncomingEvent) -> Result<Option<Self>> {
        let parsed = match ev.event_type.as_str() {
            EVENT_ONLINE_USERS => ChannelEvent::OnlineUsers(serde_json::from_value(ev.data)?),
            EVENT_NEW_MESSAGE => ChannelEvent::NewMessage(serde_json::from_value(ev.data)?),
            EVENT_MESSAGE_SENT => ChannelEvent::MessageSent(serde_json::from_value(ev.data)?),
            EVENT_MESSAGE_DELETED => {
                let p: DeletedPayload = serde_json::from_value(ev.data)?;
                ChannelEvent::MessageDeleted { message_id: p.message_id }
            }
            other => {
                log::debug!("ignoring channel event {other}");
                return Ok(None);
            }
        };
        Ok(Some(parsed))
    }
}

/// One decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake with session parameters.
    Open(Value),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace connect acknowledged.
    Connect,
    ConnectError(String),
    Disconnect,
    Event(IncomingEvent),
}

impl Packet {
    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::Channel("empty frame".into()))?;
        let rest = chars.as_str();
        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '6' => Ok(Packet::Noop),
            '4' => decode_socket_packet(rest),
            other => Err(Error::Channel(format!("unknown engine packet type {other:?}"))),
        }
    }

    /// Text frame for the packets a client sends.
    pub fn encode(&self) -> Option<String> {
        match self {
            Packet::Ping => Some("2".into()),
            Packet::Pong => Some("3".into()),
            Packet::Close => Some("1".into()),
            Packet::Connect => Some("40".into()),
            Packet::Disconnect => Some("41".into()),
            Packet::Event(ev) => {
                let body = serde_json::json!([ev.event_type, ev.data]);
                Some(format!("42{body}"))
            }
            Packet::Open(_) | Packet::Noop | Packet::ConnectError(_) => None,
        }
    }
}

fn decode_socket_packet(rest: &str) -> Result<Packet> {
    let mut chars = rest.chars();
    let kind = chars
        .next()
        .ok_or_else(|| Error::Channel("empty socket packet".into()))?;
    let body = strip_namespace(chars.as_str());
    match kind {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            // optional ack id precedes the payload array
            let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
            let items: Vec<Value> = serde_json::from_str(body)?;
            let mut items = items.into_iter();
            let name = match items.next() {
                Some(Value::String(s)) => s,
                _ => return Err(Error::Channel("event without a name".into())),
            };
            Ok(Packet::Event(IncomingEvent {
                event_type: name,
                data: items.next().unwrap_or(Value::Null),
            }))
        }
        '4' => {
            let msg = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| body.to_string());
            Ok(Packet::ConnectError(msg))
        }
        other => Err(Error::Channel(format!("unsupported socket packet type {other:?}"))),
    }
}

fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        body.split_once(',').map(|(_, b)| b).unwrap_or("")
    } else {
        body
    }
}
