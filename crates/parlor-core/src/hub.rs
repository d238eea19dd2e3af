//! The hub: composition root owning the registry, presence engine,
//! emitter, session store and handler tables.
//!
//! The transport drives it with three calls per connection:
//! [`Hub::connect`], [`Hub::dispatch_text`] (or [`Hub::dispatch`]) for each
//! inbound frame, and [`Hub::disconnect`] exactly once at teardown.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, instrument, warn};

use crate::dispatch::{ChatCommand, CommandRegistry, Dispatcher, EventContext, EventHandler};
use crate::emitter::{HtmlEntitySanitizer, NotificationEmitter, Sanitizer};
use crate::error::CoreError;
use crate::presence::{JoinOutcome, LeaveOutcome, RoomPresenceEngine};
use crate::protocol::{events, InboundFrame, OutboundFrame};
use crate::registry::ConnectionRegistry;
use crate::session::SessionStore;
use crate::types::{ConnectionId, Identity, RoomName};

/// Notice sent to connections closed by the single-session policy.
pub const CONNECTED_ELSEWHERE_NOTICE: &str = "You have connected in another window, disconnecting.";

const EVENT_BUS_CAPACITY: usize = 1024;

/// Hub behaviour toggles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Close an identity's older connections when it connects again
    pub single_session: bool,
    /// Rejoin the session's persisted rooms on connect
    pub restore_rooms: bool,
    /// Capacity of each connection's outbound channel
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            single_session: true,
            restore_rooms: true,
            outbound_buffer: 256,
        }
    }
}

/// Lifecycle events published for consuming code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Connected {
        connection: ConnectionId,
        identity: Identity,
    },
    Subscribed {
        connection: ConnectionId,
        identity: Identity,
        room_name: RoomName,
        outcome: JoinOutcome,
    },
    Unsubscribed {
        connection: ConnectionId,
        identity: Identity,
        room_name: RoomName,
        outcome: LeaveOutcome,
    },
    Disconnected {
        connection: ConnectionId,
        identity: Identity,
        /// Rooms the connection was in when it went away
        rooms: Vec<RoomName>,
    },
}

/// Shared services handed to event handlers and commands.
pub struct Services {
    pub registry: Arc<ConnectionRegistry>,
    pub presence: RoomPresenceEngine,
    pub emitter: NotificationEmitter,
    pub sessions: Arc<dyn SessionStore>,
    pub commands: CommandRegistry,
    events: broadcast::Sender<HubEvent>,
}

impl Services {
    /// Publish a lifecycle event; having no listeners is fine.
    pub fn publish(&self, event: HubEvent) {
        let _ = self.events.send(event);
    }
}

/// Collects configuration, handlers and commands before the hub starts.
pub struct HubBuilder {
    config: HubConfig,
    sessions: Arc<dyn SessionStore>,
    sanitizer: Arc<dyn Sanitizer>,
    dispatcher: Dispatcher,
    commands: CommandRegistry,
}

impl HubBuilder {
    /// Start from the core handlers and built-in commands.
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            config: HubConfig::default(),
            sessions,
            sanitizer: Arc::new(HtmlEntitySanitizer),
            dispatcher: Dispatcher::with_core_handlers(),
            commands: CommandRegistry::with_builtins(),
        }
    }

    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Register a handler for an additional transport event.
    pub fn register_handler(
        &mut self,
        event: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<&mut Self, CoreError> {
        self.dispatcher.register(event, handler)?;
        Ok(self)
    }

    /// Register a slash command.
    pub fn register_command(
        &mut self,
        name: impl Into<String>,
        command: Arc<dyn ChatCommand>,
    ) -> Result<&mut Self, CoreError> {
        self.commands.register(name, command)?;
        Ok(self)
    }

    /// Freeze the tables and create the hub.
    pub fn build(self) -> Hub {
        let registry = Arc::new(ConnectionRegistry::new());
        let emitter = NotificationEmitter::new(registry.clone(), self.sanitizer);
        let presence = RoomPresenceEngine::new(registry.clone(), emitter.clone());
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        info!(
            events = ?self.dispatcher.event_names(),
            commands = ?self.commands.names(),
            single_session = self.config.single_session,
            restore_rooms = self.config.restore_rooms,
            "Hub built"
        );

        Hub {
            inner: Arc::new(HubInner {
                config: self.config,
                dispatcher: self.dispatcher,
                services: Services {
                    registry,
                    presence,
                    emitter,
                    sessions: self.sessions,
                    commands: self.commands,
                    events,
                },
            }),
        }
    }
}

struct HubInner {
    config: HubConfig,
    dispatcher: Dispatcher,
    services: Services,
}

/// Cheaply cloneable handle to the running core.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.services.registry
    }

    pub fn presence(&self) -> &RoomPresenceEngine {
        &self.inner.services.presence
    }

    pub fn emitter(&self) -> &NotificationEmitter {
        &self.inner.services.emitter
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<HubEvent> {
        self.inner.services.events.subscribe()
    }

    /// A channel pair sized for one connection's outbound frames.
    pub fn outbound_channel(&self) -> (mpsc::Sender<OutboundFrame>, mpsc::Receiver<OutboundFrame>) {
        mpsc::channel(self.inner.config.outbound_buffer.max(1))
    }

    /// Bind a new connection to an identity.
    ///
    /// Applies the single-session policy, then replays the session's rooms.
    #[instrument(skip(self, sender), fields(identity = %identity))]
    pub async fn connect(
        &self,
        identity: Identity,
        sender: mpsc::Sender<OutboundFrame>,
    ) -> Result<ConnectionId, CoreError> {
        let services = &self.inner.services;
        let connection = ConnectionId::new();
        services.registry.register(connection, identity.clone(), sender)?;
        services.publish(HubEvent::Connected {
            connection,
            identity: identity.clone(),
        });
        info!(conn = %connection, "Connection registered");

        if self.inner.config.single_session {
            self.disconnect_other_connections(&identity, connection);
        }

        if self.inner.config.restore_rooms {
            self.restore_rooms(connection, &identity).await;
        }

        Ok(connection)
    }

    /// Rejoin the rooms persisted in the identity's session.
    ///
    /// Failures are logged and leave the connection usable without them.
    async fn restore_rooms(&self, connection: ConnectionId, identity: &Identity) {
        let services = &self.inner.services;
        let rooms = match services.sessions.rooms(identity).await {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!(conn = %connection, error = %e, "Could not load session rooms");
                return;
            }
        };

        for room in rooms {
            match services.presence.join(connection, &room).await {
                Ok(outcome) => services.publish(HubEvent::Subscribed {
                    connection,
                    identity: identity.clone(),
                    room_name: room,
                    outcome,
                }),
                Err(e) => warn!(conn = %connection, room = %room, error = %e, "Could not restore room"),
            }
        }
    }

    /// Notify and close every other connection of the identity.
    ///
    /// Closure is fire-and-forget; each closed connection goes through
    /// [`disconnect`](Self::disconnect) when its transport reports it.
    pub fn disconnect_other_connections(&self, identity: &Identity, keep: ConnectionId) -> usize {
        let emitter = &self.inner.services.emitter;
        let mut closed = 0;
        for other in self.inner.services.registry.connections_for_identity(identity) {
            if other.id == keep {
                continue;
            }
            emitter.notify(other.id, CONNECTED_ELSEWHERE_NOTICE, None);
            emitter.close(other.id);
            closed += 1;
        }
        if closed > 0 {
            info!(identity = %identity, closed, "Closed connections held elsewhere");
        }
        closed
    }

    /// Decode and dispatch one inbound text frame.
    pub async fn dispatch_text(&self, connection: ConnectionId, text: &str) -> Result<(), CoreError> {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn = %connection, error = %e, "Dropping undecodable frame");
                return Err(e);
            }
        };
        self.dispatch(connection, frame).await
    }

    /// Dispatch one client event.
    ///
    /// Malformed payloads and unknown event names are logged and returned;
    /// nothing is sent to the client. `disconnect` is reserved for the
    /// transport and rejected here.
    pub async fn dispatch(&self, connection: ConnectionId, frame: InboundFrame) -> Result<(), CoreError> {
        if frame.event == events::DISCONNECT {
            let err = CoreError::malformed(events::DISCONNECT, "reserved for the transport");
            warn!(conn = %connection, error = %err, "Dropping client event");
            return Err(err);
        }
        self.run_handler(connection, &frame.event, &frame.data).await
    }

    /// Tear down a connection. Call exactly once, when the transport closes it.
    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), CoreError> {
        self.run_handler(connection, events::DISCONNECT, &Value::Null).await
    }

    async fn run_handler(&self, connection: ConnectionId, event: &str, data: &Value) -> Result<(), CoreError> {
        let services = &self.inner.services;
        let identity = match services.registry.identity_of(connection) {
            Some(identity) => identity,
            None => {
                let err = CoreError::UnknownConnection(connection);
                warn!(event = %event, error = %err, "Event for unregistered connection");
                return Err(err);
            }
        };

        let ctx = EventContext {
            services,
            connection,
            identity,
            event,
        };
        let result = self.inner.dispatcher.dispatch(&ctx, data).await;
        if let Err(e) = &result {
            warn!(conn = %connection, identity = %ctx.identity, event = %event, error = %e, "Event dropped");
        }
        result
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("config", &self.inner.config)
            .field("dispatcher", &self.inner.dispatcher)
            .field("registry", &self.inner.services.registry)
            .finish()
    }
}
