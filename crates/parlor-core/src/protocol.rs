//! Wire payloads exchanged with the transport.
//!
//! Every frame is `{"event": <name>, "data": <object>}`. Field names are
//! camelCase; `time` is milliseconds since the UNIX epoch.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::{Identity, RoomName};

/// Inbound event names handled by the core.
pub mod events {
    /// Join a room.
    pub const SUBSCRIBE: &str = "subscribe";
    /// Leave a room.
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    /// Send a message (or slash command) to a room.
    pub const MESSAGE: &str = "message";
    /// Request the deduplicated member list of a room.
    pub const USER_LIST: &str = "userList";
    /// Connection teardown, fired by the transport only.
    pub const DISCONNECT: &str = "disconnect";
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundFrame {
    /// Event name used to look up the handler
    pub event: String,
    /// Event payload; absent is treated as an empty object
    #[serde(default)]
    pub data: Value,
}

impl InboundFrame {
    /// Create a frame from an event name and payload.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Decode a JSON text frame.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text).map_err(|e| CoreError::malformed("<unparsed>", e.to_string()))
    }
}

/// Decode an event payload into its typed form.
///
/// A null payload decodes as the type's default so that absent fields are
/// reported by the handler as missing rather than as a decode failure.
pub fn decode_payload<T>(event: &str, data: &Value) -> Result<T, CoreError>
where
    T: DeserializeOwned + Default,
{
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data.clone()).map_err(|e| CoreError::malformed(event, e.to_string()))
}

/// Return a required field or a malformed-event error naming it.
pub fn require<'a>(event: &str, field: &str, value: &'a Option<String>) -> Result<&'a str, CoreError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(CoreError::malformed(event, format!("empty {}", field))),
        None => Err(CoreError::malformed(event, format!("missing {}", field))),
    }
}

/// Payload of `subscribe`, `unsubscribe` and `userList`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    /// Target room
    pub room_name: Option<String>,
}

/// Payload of `message`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Target room
    pub room_name: Option<String>,
    /// Message body, possibly a slash command
    pub message: Option<String>,
}

/// Outbound events sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Deduplicated member list of a room
    UserList(UserListEvent),
    /// A chat message from an identity
    Message(MessageEvent),
    /// A system notice
    Notification(NotificationEvent),
}

impl ServerEvent {
    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// `userList {roomName, users}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListEvent {
    pub room_name: RoomName,
    pub users: Vec<Identity>,
}

/// `message {time, username, roomName|null, message}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub time: i64,
    pub username: Identity,
    pub room_name: Option<RoomName>,
    pub message: String,
}

/// `notification {time, message, roomName|null}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub time: i64,
    pub message: String,
    pub room_name: Option<RoomName>,
}

/// What the core pushes down a connection's outbound channel.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Serialize and send to the client
    Event(ServerEvent),
    /// Close the connection; the transport reports the disconnect later
    Close,
}

impl OutboundFrame {
    /// The carried event, if this is not a close request.
    pub fn event(&self) -> Option<&ServerEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Close => None,
        }
    }
}
