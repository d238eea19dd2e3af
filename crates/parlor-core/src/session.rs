//! Session store seam.
//!
//! Identity and the per-identity room list live outside the core, in
//! whatever session mechanism the deployment uses. The core only reads the
//! identity at connect time and keeps the room list current so that a
//! reconnecting client gets its rooms back.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::{Identity, RoomName};

/// External persistence of identities and their room lists.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Resolve a session token presented by the transport.
    async fn identity_for_token(&self, token: &str) -> Result<Option<Identity>, CoreError>;

    /// Rooms persisted for the identity, in the order they were added.
    async fn rooms(&self, identity: &Identity) -> Result<Vec<RoomName>, CoreError>;

    /// Append a room unless it is already listed.
    async fn add_room(&self, identity: &Identity, room: &str) -> Result<(), CoreError>;

    /// Remove a room from the list.
    async fn remove_room(&self, identity: &Identity, room: &str) -> Result<(), CoreError>;
}

/// In-process session store.
///
/// Tokens are minted by [`open_session`](Self::open_session) without any
/// credential check; it stands in for the login flow of an external
/// session mechanism.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    tokens: DashMap<String, Identity>,
    rooms: DashMap<Identity, Vec<RoomName>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a session token for an identity.
    pub fn open_session(&self, identity: Identity) -> String {
        let token = Uuid::new_v4().simple().to_string();
        debug!(identity = %identity, "Opened session");
        self.tokens.insert(token.clone(), identity);
        token
    }

    /// Invalidate a token. The identity's room list is kept.
    pub fn close_session(&self, token: &str) -> Option<Identity> {
        self.tokens.remove(token).map(|(_, identity)| identity)
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn identity_for_token(&self, token: &str) -> Result<Option<Identity>, CoreError> {
        Ok(self.tokens.get(token).map(|entry| entry.value().clone()))
    }

    async fn rooms(&self, identity: &Identity) -> Result<Vec<RoomName>, CoreError> {
        Ok(self
            .rooms
            .get(identity)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn add_room(&self, identity: &Identity, room: &str) -> Result<(), CoreError> {
        let mut rooms = self.rooms.entry(identity.clone()).or_default();
        if !rooms.iter().any(|r| r == room) {
            rooms.push(room.to_string());
        }
        Ok(())
    }

    async fn remove_room(&self, identity: &Identity, room: &str) -> Result<(), CoreError> {
        if let Some(mut rooms) = self.rooms.get_mut(identity) {
            rooms.retain(|r| r != room);
        }
        Ok(())
    }
}
