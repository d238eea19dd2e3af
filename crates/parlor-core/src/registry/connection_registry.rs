//! Connection Registry implementation.
//!
//! Tracks live connections by id for presence computation and routing.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::error::CoreError;
use crate::protocol::OutboundFrame;
use crate::types::{ConnectionId, Identity, RoomName};

/// Connection state stored in the registry.
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Identity the connection acts for, fixed at registration
    pub identity: Identity,
    /// Rooms this connection has joined
    pub rooms: BTreeSet<RoomName>,
    /// Channel to deliver frames to this connection
    pub sender: mpsc::Sender<OutboundFrame>,
    /// Registration order, used to list an identity's connections oldest first
    pub sequence: u64,
}

impl ConnectionEntry {
    fn snapshot(&self, id: ConnectionId) -> ConnectionSnapshot {
        ConnectionSnapshot {
            id,
            identity: self.identity.clone(),
            rooms: self.rooms.iter().cloned().collect(),
        }
    }
}

/// A point-in-time copy of a connection's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub identity: Identity,
    /// Joined rooms in name order
    pub rooms: Vec<RoomName>,
}

/// Result of attempting to deliver a frame to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Frame was queued for delivery
    Sent,
    /// The connection is not registered
    NotConnected,
    /// The connection's channel is full (backpressure)
    ChannelFull,
    /// The connection's channel is closed
    ChannelClosed,
}

impl SendResult {
    /// Whether the frame was queued.
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Registry of live connections.
///
/// Thread-safe map from connection id to entry. Uses DashMap for concurrent
/// access; no method holds a map reference while calling another method.
///
/// ## Usage
///
/// ```ignore
/// let registry = ConnectionRegistry::new();
///
/// // On transport connect:
/// let (tx, rx) = mpsc::channel(256);
/// registry.register(id, Identity::new("alice"), tx)?;
///
/// registry.join_room(id, "lobby")?;
/// let users = registry.identities_in_room("lobby");
///
/// // On transport disconnect:
/// registry.unregister(id)?;
/// ```
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    next_sequence: AtomicU64,
}

impl ConnectionRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            connections: DashMap::new(),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Register a connection with an empty room set.
    #[instrument(skip(self, sender), fields(conn = %id, identity = %identity))]
    pub fn register(
        &self,
        id: ConnectionId,
        identity: Identity,
        sender: mpsc::Sender<OutboundFrame>,
    ) -> Result<(), CoreError> {
        match self.connections.entry(id) {
            Entry::Occupied(_) => {
                warn!("Connection already registered");
                Err(CoreError::DuplicateConnection(id))
            }
            Entry::Vacant(vacant) => {
                let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
                vacant.insert(ConnectionEntry {
                    identity,
                    rooms: BTreeSet::new(),
                    sender,
                    sequence,
                });
                debug!("Registered new connection");
                Ok(())
            }
        }
    }

    /// Remove a connection, returning its final record.
    #[instrument(skip(self), fields(conn = %id))]
    pub fn unregister(&self, id: ConnectionId) -> Result<ConnectionSnapshot, CoreError> {
        match self.connections.remove(&id) {
            Some((_, entry)) => {
                debug!("Unregistered connection");
                Ok(entry.snapshot(id))
            }
            None => {
                debug!("Connection was not registered");
                Err(CoreError::UnknownConnection(id))
            }
        }
    }

    /// Add a room to the connection's room set.
    ///
    /// Idempotent; returns whether the set changed.
    #[instrument(skip(self), fields(conn = %id))]
    pub fn join_room(&self, id: ConnectionId, room: &str) -> Result<bool, CoreError> {
        let mut entry = self
            .connections
            .get_mut(&id)
            .ok_or(CoreError::UnknownConnection(id))?;
        Ok(entry.rooms.insert(room.to_string()))
    }

    /// Remove a room from the connection's room set.
    ///
    /// Idempotent; returns whether the set changed.
    #[instrument(skip(self), fields(conn = %id))]
    pub fn leave_room(&self, id: ConnectionId, room: &str) -> Result<bool, CoreError> {
        let mut entry = self
            .connections
            .get_mut(&id)
            .ok_or(CoreError::UnknownConnection(id))?;
        Ok(entry.rooms.remove(room))
    }

    /// Check if a connection is registered.
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Get the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Identity a connection acts for.
    pub fn identity_of(&self, id: ConnectionId) -> Option<Identity> {
        self.connections.get(&id).map(|entry| entry.identity.clone())
    }

    /// Copy of a connection's record.
    pub fn snapshot(&self, id: ConnectionId) -> Result<ConnectionSnapshot, CoreError> {
        self.connections
            .get(&id)
            .map(|entry| entry.snapshot(id))
            .ok_or(CoreError::UnknownConnection(id))
    }

    /// Deduplicated identities with at least one connection in the room.
    ///
    /// Scans every connection; ordered by username.
    pub fn identities_in_room(&self, room: &str) -> BTreeSet<Identity> {
        self.connections
            .iter()
            .filter(|entry| entry.value().rooms.contains(room))
            .map(|entry| entry.value().identity.clone())
            .collect()
    }

    /// Every connection currently joined to the room.
    pub fn connections_in_room(&self, room: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.value().rooms.contains(room))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Every connection bound to the identity, oldest first.
    pub fn connections_for_identity(&self, identity: &Identity) -> Vec<ConnectionSnapshot> {
        let mut matching: Vec<(u64, ConnectionSnapshot)> = self
            .connections
            .iter()
            .filter(|entry| entry.value().identity == *identity)
            .map(|entry| (entry.value().sequence, entry.value().snapshot(*entry.key())))
            .collect();
        matching.sort_by_key(|(sequence, _)| *sequence);
        matching.into_iter().map(|(_, snapshot)| snapshot).collect()
    }

    /// Queue a frame for a connection.
    ///
    /// Never blocks. A closed channel leaves the entry in place: removal
    /// belongs to the disconnect path so that it happens exactly once.
    #[instrument(skip(self, frame), fields(to = %id))]
    pub fn send_to(&self, id: ConnectionId, frame: OutboundFrame) -> SendResult {
        let sender = match self.connections.get(&id) {
            Some(entry) => entry.value().sender.clone(),
            None => {
                debug!("Recipient not connected");
                return SendResult::NotConnected;
            }
        };

        match sender.try_send(frame) {
            Ok(()) => SendResult::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound channel full, dropping frame");
                SendResult::ChannelFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbound channel closed, connection may have dropped");
                SendResult::ChannelClosed
            }
        }
    }

    /// Queue a frame for several connections.
    pub fn send_to_many<I>(&self, recipients: I, frame: &OutboundFrame) -> Vec<(ConnectionId, SendResult)>
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        recipients
            .into_iter()
            .map(|id| (id, self.send_to(id, frame.clone())))
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}
