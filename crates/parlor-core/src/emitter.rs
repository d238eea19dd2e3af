//! Notification Emitter.
//!
//! Formats outbound message, notification and user-list payloads and routes
//! them to one connection, to the rest of a room, or to every connection of
//! an identity. A missing room name means the payload is not room scoped and
//! the client shows it in every open room view.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace};

use crate::protocol::{MessageEvent, NotificationEvent, OutboundFrame, ServerEvent, UserListEvent};
use crate::registry::{ConnectionRegistry, SendResult};
use crate::types::{ConnectionId, Identity};

/// Cleans message and notification bodies before they leave the server.
pub trait Sanitizer: Send + Sync + 'static {
    fn sanitize(&self, text: &str) -> String;
}

/// HTML entity encoding of `& < > " ' /`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlEntitySanitizer;

impl Sanitizer for HtmlEntitySanitizer {
    fn sanitize(&self, text: &str) -> String {
        html_escape::encode_safe(text).into_owned()
    }
}

/// Leaves text untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSanitizer;

impl Sanitizer for PassthroughSanitizer {
    fn sanitize(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Server clock in milliseconds since the UNIX epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Routes outbound events through the connection registry.
#[derive(Clone)]
pub struct NotificationEmitter {
    registry: Arc<ConnectionRegistry>,
    sanitizer: Arc<dyn Sanitizer>,
}

impl NotificationEmitter {
    pub fn new(registry: Arc<ConnectionRegistry>, sanitizer: Arc<dyn Sanitizer>) -> Self {
        Self { registry, sanitizer }
    }

    // Payload construction

    /// Build a timestamped notification.
    pub fn notification(&self, message: &str, room_name: Option<&str>) -> ServerEvent {
        ServerEvent::Notification(NotificationEvent {
            time: now_millis(),
            message: self.sanitizer.sanitize(message),
            room_name: room_name.map(str::to_string),
        })
    }

    /// Build a timestamped message from an identity.
    pub fn message(&self, from: &Identity, message: &str, room_name: Option<&str>) -> ServerEvent {
        ServerEvent::Message(MessageEvent {
            time: now_millis(),
            username: from.clone(),
            room_name: room_name.map(str::to_string),
            message: self.sanitizer.sanitize(message),
        })
    }

    /// Build a user list; usernames are sent as-is.
    pub fn user_list<I>(&self, room_name: &str, users: I) -> ServerEvent
    where
        I: IntoIterator<Item = Identity>,
    {
        ServerEvent::UserList(UserListEvent {
            room_name: room_name.to_string(),
            users: users.into_iter().collect(),
        })
    }

    // Delivery modes

    /// Deliver an event to one connection.
    pub fn unicast(&self, connection: ConnectionId, event: ServerEvent) -> SendResult {
        self.registry.send_to(connection, OutboundFrame::Event(event))
    }

    /// Deliver an event to every other connection joined to the room.
    ///
    /// Returns the number of connections the event was queued for.
    pub fn room_broadcast_excluding(
        &self,
        connection: ConnectionId,
        room_name: &str,
        event: ServerEvent,
    ) -> usize {
        let recipients = self
            .registry
            .connections_in_room(room_name)
            .into_iter()
            .filter(|id| *id != connection);
        let delivered = self.deliver_all(recipients, event);
        trace!(room = %room_name, delivered, "Room broadcast");
        delivered
    }

    /// Deliver an event to every connection joined to the room.
    pub fn room_broadcast(&self, room_name: &str, event: ServerEvent) -> usize {
        let recipients = self.registry.connections_in_room(room_name);
        self.deliver_all(recipients, event)
    }

    /// Deliver an event to every connection bound to the identity.
    pub fn identity_unicast(&self, identity: &Identity, event: ServerEvent) -> usize {
        let recipients = self
            .registry
            .connections_for_identity(identity)
            .into_iter()
            .map(|c| c.id);
        let delivered = self.deliver_all(recipients, event);
        debug!(identity = %identity, delivered, "Identity unicast");
        delivered
    }

    /// Ask the transport to close a connection. Fire-and-forget.
    pub fn close(&self, connection: ConnectionId) -> SendResult {
        self.registry.send_to(connection, OutboundFrame::Close)
    }

    fn deliver_all<I>(&self, recipients: I, event: ServerEvent) -> usize
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        let frame = OutboundFrame::Event(event);
        self.registry
            .send_to_many(recipients, &frame)
            .into_iter()
            .filter(|(_, result)| result.is_sent())
            .count()
    }

    // Convenience wrappers

    /// Private notification to one connection.
    pub fn notify(&self, connection: ConnectionId, message: &str, room_name: Option<&str>) -> SendResult {
        self.unicast(connection, self.notification(message, room_name))
    }

    /// Notification to the rest of a room.
    pub fn notify_room_excluding(&self, connection: ConnectionId, room_name: &str, message: &str) -> usize {
        self.room_broadcast_excluding(connection, room_name, self.notification(message, Some(room_name)))
    }

    /// Notification to every connection of an identity.
    pub fn notify_identity(&self, identity: &Identity, message: &str, room_name: Option<&str>) -> usize {
        self.identity_unicast(identity, self.notification(message, room_name))
    }

    /// Direct message to one connection.
    pub fn send_message(
        &self,
        connection: ConnectionId,
        from: &Identity,
        message: &str,
        room_name: Option<&str>,
    ) -> SendResult {
        self.unicast(connection, self.message(from, message, room_name))
    }

    /// Message from an identity to the rest of a room.
    pub fn send_room_message(
        &self,
        connection: ConnectionId,
        room_name: &str,
        from: &Identity,
        message: &str,
    ) -> usize {
        self.room_broadcast_excluding(connection, room_name, self.message(from, message, Some(room_name)))
    }

    /// Current user list of a room to one connection.
    pub fn send_user_list<I>(&self, connection: ConnectionId, room_name: &str, users: I) -> SendResult
    where
        I: IntoIterator<Item = Identity>,
    {
        self.unicast(connection, self.user_list(room_name, users))
    }

    /// User list to the rest of a room.
    pub fn broadcast_user_list_excluding<I>(&self, connection: ConnectionId, room_name: &str, users: I) -> usize
    where
        I: IntoIterator<Item = Identity>,
    {
        self.room_broadcast_excluding(connection, room_name, self.user_list(room_name, users))
    }
}

impl std::fmt::Debug for NotificationEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationEmitter").finish_non_exhaustive()
    }
}
