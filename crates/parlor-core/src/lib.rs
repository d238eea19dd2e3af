//! # parlor-core
//!
//! Room presence and notification delivery for chat rooms served over
//! persistent bidirectional connections.
//!
//! ## Architecture
//!
//! - **Connection Registry**: live connections, their identity and joined rooms
//! - **Room Presence Engine**: join/leave transitions deduplicated by identity
//! - **Dispatcher**: inbound events and slash commands routed to typed handlers
//! - **Notification Emitter**: unicast, room broadcast and identity-wide delivery
//!
//! ```text
//! transport ──frame──> Hub ──> Dispatcher ──> handler ──> RoomPresenceEngine
//!                                                │                │
//!                                                v                v
//!                                       NotificationEmitter <── ConnectionRegistry
//!                                                │
//!                                                v
//!                                      mpsc::Sender<OutboundFrame> (per connection)
//! ```
//!
//! Room membership is not stored separately: a room is the set of identities
//! with at least one connection that has joined it, derived on demand from
//! the registry.

pub mod dispatch;
pub mod emitter;
pub mod hub;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod session;

mod error;
mod types;

pub use dispatch::{ChatCommand, CommandContext, CommandRegistry, EventContext, EventHandler};
pub use emitter::{HtmlEntitySanitizer, NotificationEmitter, PassthroughSanitizer, Sanitizer};
pub use error::CoreError;
pub use hub::{Hub, HubBuilder, HubConfig, HubEvent, Services};
pub use presence::{JoinOutcome, LeaveOutcome, RoomPresenceEngine};
pub use protocol::{InboundFrame, OutboundFrame, ServerEvent};
pub use registry::{ConnectionRegistry, ConnectionSnapshot, SendResult};
pub use session::{MemorySessionStore, SessionStore};
pub use types::*;
