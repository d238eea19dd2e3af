//! Common types used across the presence core.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pseudo-identity used as the sender of system-generated messages.
pub const ADMIN_IDENTITY: &str = "admin";

/// Name of a room. Rooms are not stored objects, only names.
pub type RoomName = String;

/// The authenticated username a connection acts on behalf of.
///
/// Supplied by the session layer at connect time and fixed for the
/// lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create a new identity from a username.
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    /// Whether a username is held back for the server's own messages.
    pub fn is_reserved(username: &str) -> bool {
        username.eq_ignore_ascii_case(ADMIN_IDENTITY)
    }

    /// Borrow the username.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unique id of one live transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying uuid.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
