//! Event and command dispatch.
//!
//! Two typed capability tables, both frozen once the [`Hub`](crate::Hub) is
//! built:
//!
//! - transport events (`subscribe`, `unsubscribe`, `message`, `userList`,
//!   `disconnect` and any extra names registered at setup) mapped to an
//!   [`EventHandler`]
//! - slash commands parsed out of a `message` body mapped to a
//!   [`ChatCommand`]
//!
//! Registration goes through [`HubBuilder`](crate::HubBuilder); a built hub
//! has no way to add handlers, so everything must be registered before the
//! hub accepts its first connection.

mod commands;
mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::hub::Services;
use crate::types::{ConnectionId, Identity};

pub use commands::{parse_command, ChatCommand, CommandContext, CommandRegistry, ListCommands};
pub use handlers::{
    DisconnectHandler, MessageHandler, SubscribeHandler, UnsubscribeHandler, UserListHandler,
};

/// Everything a handler knows about the event it is handling.
pub struct EventContext<'a> {
    /// Shared core services
    pub services: &'a Services,
    /// Connection the event arrived on
    pub connection: ConnectionId,
    /// Identity bound to that connection
    pub identity: Identity,
    /// Event name as registered
    pub event: &'a str,
}

/// Handler for one inbound transport event.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: &EventContext<'_>, data: &Value) -> Result<(), CoreError>;
}

/// Event-name to handler table.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl Dispatcher {
    /// Table with the five core handlers registered.
    pub fn with_core_handlers() -> Self {
        use crate::protocol::events;

        let mut handlers: HashMap<String, Arc<dyn EventHandler>> = HashMap::new();
        handlers.insert(events::SUBSCRIBE.to_string(), Arc::new(SubscribeHandler));
        handlers.insert(events::UNSUBSCRIBE.to_string(), Arc::new(UnsubscribeHandler));
        handlers.insert(events::MESSAGE.to_string(), Arc::new(MessageHandler));
        handlers.insert(events::USER_LIST.to_string(), Arc::new(UserListHandler));
        handlers.insert(events::DISCONNECT.to_string(), Arc::new(DisconnectHandler));
        Self { handlers }
    }

    /// Add a handler for a new event name.
    pub fn register(
        &mut self,
        event: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), CoreError> {
        let event = event.into();
        if self.handlers.contains_key(&event) {
            return Err(CoreError::DuplicateHandlerRegistration(event));
        }
        info!(event = %event, "Registered event handler");
        self.handlers.insert(event, handler);
        Ok(())
    }

    /// Whether a handler exists for the event name.
    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Registered event names, sorted.
    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Route an event to its handler.
    pub async fn dispatch(&self, ctx: &EventContext<'_>, data: &Value) -> Result<(), CoreError> {
        let handler = self
            .handlers
            .get(ctx.event)
            .ok_or_else(|| CoreError::UnknownEvent(ctx.event.to_string()))?;
        debug!(event = %ctx.event, conn = %ctx.connection, "Dispatching event");
        handler.handle(ctx, data).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("events", &self.event_names())
            .finish()
    }
}
