//! Test utilities for driving a hub the way a transport would.
//!
//! Each [`TestClient`] owns the receiving end of one connection's outbound
//! channel and offers helpers to drain and classify what the core sent.

#![allow(dead_code)]

use std::sync::Arc;

use parlor_core::protocol::{MessageEvent, NotificationEvent, UserListEvent};
use parlor_core::{
    ConnectionId, Hub, HubBuilder, HubConfig, Identity, MemorySessionStore, OutboundFrame,
    PassthroughSanitizer, ServerEvent,
};
use serde_json::json;
use tokio::sync::mpsc;

/// Hub config with single-session enforcement off, so one identity can hold
/// several connections.
pub fn multi_session_config() -> HubConfig {
    HubConfig {
        single_session: false,
        ..HubConfig::default()
    }
}

/// A hub over an in-memory session store.
pub fn test_hub(config: HubConfig) -> (Hub, Arc<MemorySessionStore>) {
    let sessions = Arc::new(MemorySessionStore::new());
    let hub = HubBuilder::new(sessions.clone())
        .config(config)
        .sanitizer(Arc::new(PassthroughSanitizer))
        .build();
    (hub, sessions)
}

/// One simulated transport connection.
pub struct TestClient {
    pub id: ConnectionId,
    pub identity: Identity,
    rx: mpsc::Receiver<OutboundFrame>,
}

impl TestClient {
    pub async fn connect(hub: &Hub, username: &str) -> Self {
        let (tx, rx) = hub.outbound_channel();
        let identity = Identity::new(username);
        let id = hub
            .connect(identity.clone(), tx)
            .await
            .expect("connect should succeed");
        Self { id, identity, rx }
    }

    pub async fn subscribe(&self, hub: &Hub, room: &str) {
        self.send(hub, "subscribe", json!({ "roomName": room })).await;
    }

    pub async fn unsubscribe(&self, hub: &Hub, room: &str) {
        self.send(hub, "unsubscribe", json!({ "roomName": room })).await;
    }

    pub async fn say(&self, hub: &Hub, room: &str, message: &str) {
        self.send(hub, "message", json!({ "roomName": room, "message": message }))
            .await;
    }

    pub async fn send(&self, hub: &Hub, event: &str, data: serde_json::Value) {
        let text = json!({ "event": event, "data": data }).to_string();
        hub.dispatch_text(self.id, &text)
            .await
            .expect("dispatch should succeed");
    }

    /// Everything queued for this connection so far.
    pub fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Drain and keep only notifications.
    pub fn notifications(&mut self) -> Vec<NotificationEvent> {
        self.drain()
            .into_iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Event(ServerEvent::Notification(n)) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Drain and keep only notification texts.
    pub fn notification_texts(&mut self) -> Vec<String> {
        self.notifications().into_iter().map(|n| n.message).collect()
    }

    /// Drain and keep only chat messages.
    pub fn messages(&mut self) -> Vec<MessageEvent> {
        self.drain()
            .into_iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Event(ServerEvent::Message(m)) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Drain and keep only user lists.
    pub fn user_lists(&mut self) -> Vec<UserListEvent> {
        self.drain()
            .into_iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Event(ServerEvent::UserList(list)) => Some(list),
                _ => None,
            })
            .collect()
    }
}

/// Usernames of a user list, for terse assertions.
pub fn usernames(list: &UserListEvent) -> Vec<&str> {
    list.users.iter().map(Identity::as_str).collect()
}
