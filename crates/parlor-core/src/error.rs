//! Error types for the presence core.

use thiserror::Error;

use crate::types::ConnectionId;

/// Errors raised by the registry, presence engine and dispatcher.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An inbound event was missing a required field or could not be decoded.
    ///
    /// Dropped without a client-visible reply.
    #[error("Malformed {event} event: {reason}")]
    MalformedEvent {
        /// Event name as sent by the client
        event: String,
        /// What was wrong with it
        reason: String,
    },

    /// No handler is registered for the inbound event name.
    #[error("No handler registered for event '{0}'")]
    UnknownEvent(String),

    /// The connection id is already present in the registry
    #[error("Connection {0} is already registered")]
    DuplicateConnection(ConnectionId),

    /// The connection id is not present in the registry
    #[error("Connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    /// A chat command with this name was registered twice
    #[error("Command '/{0}' is already registered")]
    DuplicateCommandRegistration(String),

    /// An event handler with this name was registered twice
    #[error("Handler for event '{0}' is already registered")]
    DuplicateHandlerRegistration(String),

    /// A slash command that nobody registered.
    ///
    /// Reported back to the sender as a notification.
    #[error("Unknown command '/{0}'")]
    UnknownCommand(String),

    /// The external session store failed
    #[error("Session store error: {0}")]
    SessionStore(String),
}

impl CoreError {
    /// Create a new malformed event error.
    pub fn malformed(event: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            event: event.into(),
            reason: reason.into(),
        }
    }

    /// Create a new session store error.
    pub fn session_store(msg: impl Into<String>) -> Self {
        Self::SessionStore(msg.into())
    }

    /// Whether the transport should close the connection that triggered this error.
    ///
    /// Registry invariant violations are fatal to the connection; everything
    /// else is dropped or reported and the connection stays open.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::DuplicateConnection(_) | Self::UnknownConnection(_)
        )
    }

    /// Whether this error is a setup-time configuration mistake.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateCommandRegistration(_) | Self::DuplicateHandlerRegistration(_)
        )
    }
}
