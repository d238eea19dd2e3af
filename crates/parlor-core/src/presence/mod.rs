//! Room Presence Engine.
//!
//! Turns registry mutations into join/leave notifications that are
//! deduplicated by identity:
//!
//! - the room hears "X has joined" only when X goes from zero connections in
//!   the room to one; later connections get a private "rejoined" notice
//! - the room hears "X has left" / "X has disconnected" only when X's last
//!   connection in the room goes away
//!
//! Every read-mutate-read sequence runs under a per-room mutex, so two rooms
//! never block each other and two joins to the same room never both observe
//! the room without the other's effect.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::emitter::NotificationEmitter;
use crate::error::CoreError;
use crate::registry::ConnectionRegistry;
use crate::types::{ConnectionId, Identity, RoomName};

/// Result of joining a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// First connection of the identity in the room; the room was told
    Joined,
    /// The identity was already present; only the joining connection was told
    Rejoined,
}

/// Result of leaving a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Last connection of the identity left; the room was told
    Left,
    /// The identity still has another connection in the room; nothing broadcast
    StillPresent,
    /// The connection was not in the room
    NotJoined,
}

/// How a connection is leaving a room, which picks the room-wide wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    Unsubscribe,
    Disconnect,
}

impl Departure {
    fn notice(&self, identity: &Identity, room: &str) -> String {
        match self {
            Self::Unsubscribe => format!("{} has left {}.", identity, room),
            Self::Disconnect => format!("{} has disconnected from {}.", identity, room),
        }
    }
}

/// Presence decisions for every room.
pub struct RoomPresenceEngine {
    registry: Arc<ConnectionRegistry>,
    emitter: NotificationEmitter,
    room_locks: DashMap<RoomName, Arc<Mutex<()>>>,
}

impl RoomPresenceEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, emitter: NotificationEmitter) -> Self {
        Self {
            registry,
            emitter,
            room_locks: DashMap::new(),
        }
    }

    /// Deduplicated, username-ordered member list of a room.
    pub fn user_list(&self, room: &str) -> BTreeSet<Identity> {
        self.registry.identities_in_room(room)
    }

    /// Join a connection to a room and notify accordingly.
    ///
    /// The joining connection always receives the current user list followed
    /// by either "You have joined" or "You have rejoined".
    #[instrument(skip(self), fields(conn = %connection))]
    pub async fn join(&self, connection: ConnectionId, room: &str) -> Result<JoinOutcome, CoreError> {
        let identity = self
            .registry
            .identity_of(connection)
            .ok_or(CoreError::UnknownConnection(connection))?;

        let lock = self.room_lock(room);
        let outcome = {
            let _guard = lock.lock().await;

            let before = self.registry.identities_in_room(room);
            self.registry.join_room(connection, room)?;
            let after = self.registry.identities_in_room(room);

            self.emitter.send_user_list(connection, room, after.iter().cloned());

            if before.contains(&identity) {
                self.emitter
                    .notify(connection, &format!("You have rejoined {}.", room), Some(room));
                JoinOutcome::Rejoined
            } else {
                self.emitter
                    .notify(connection, &format!("You have joined {}.", room), Some(room));
                self.emitter.notify_room_excluding(
                    connection,
                    room,
                    &format!("{} has joined {}.", identity, room),
                );
                self.emitter.broadcast_user_list_excluding(connection, room, after);
                JoinOutcome::Joined
            }
        };

        info!(identity = %identity, ?outcome, "Joined room");
        Ok(outcome)
    }

    /// Leave a room on explicit unsubscribe.
    #[instrument(skip(self), fields(conn = %connection))]
    pub async fn leave(&self, connection: ConnectionId, room: &str) -> Result<LeaveOutcome, CoreError> {
        let identity = self
            .registry
            .identity_of(connection)
            .ok_or(CoreError::UnknownConnection(connection))?;
        let outcome = self
            .depart(connection, &identity, room, Departure::Unsubscribe)
            .await?;
        info!(identity = %identity, ?outcome, "Left room");
        Ok(outcome)
    }

    /// Tear down a connection: leave every room it joined, then unregister it.
    ///
    /// Rooms are taken from the registry's record of the connection, captured
    /// before unregistration, and each is left under its own room lock.
    #[instrument(skip(self), fields(conn = %connection))]
    pub async fn disconnect(
        &self,
        connection: ConnectionId,
    ) -> Result<Vec<(RoomName, LeaveOutcome)>, CoreError> {
        let record = self.registry.snapshot(connection)?;

        let mut outcomes = Vec::with_capacity(record.rooms.len());
        for room in record.rooms {
            let outcome = self
                .depart(connection, &record.identity, &room, Departure::Disconnect)
                .await?;
            outcomes.push((room, outcome));
        }

        self.registry.unregister(connection)?;
        info!(identity = %record.identity, rooms = outcomes.len(), "Connection torn down");
        Ok(outcomes)
    }

    async fn depart(
        &self,
        connection: ConnectionId,
        identity: &Identity,
        room: &str,
        departure: Departure,
    ) -> Result<LeaveOutcome, CoreError> {
        let lock = self.room_lock(room);
        let outcome = {
            let _guard = lock.lock().await;

            if !self.registry.leave_room(connection, room)? {
                LeaveOutcome::NotJoined
            } else {
                // The connection is out of the room now, so this is the
                // excluding-this-connection view.
                let remaining = self.registry.identities_in_room(room);
                if remaining.contains(identity) {
                    LeaveOutcome::StillPresent
                } else {
                    self.emitter
                        .notify_room_excluding(connection, room, &departure.notice(identity, room));
                    self.emitter
                        .broadcast_user_list_excluding(connection, room, remaining);
                    LeaveOutcome::Left
                }
            }
        };

        drop(lock);
        self.prune_room_lock(room);
        Ok(outcome)
    }

    fn room_lock(&self, room: &str) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(room.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Drop the lock entry of an empty room nobody is waiting on.
    ///
    /// Only removed while the map holds the sole reference, so a waiter can
    /// never end up on a different mutex than a later arrival.
    fn prune_room_lock(&self, room: &str) {
        if !self.registry.connections_in_room(room).is_empty() {
            return;
        }
        if self
            .room_locks
            .remove_if(room, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
        {
            debug!(room = %room, "Pruned lock for empty room");
        }
    }

    /// Number of rooms that currently have a lock entry.
    pub fn tracked_rooms(&self) -> usize {
        self.room_locks.len()
    }
}

impl std::fmt::Debug for RoomPresenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomPresenceEngine")
            .field("tracked_rooms", &self.room_locks.len())
            .finish()
    }
}
