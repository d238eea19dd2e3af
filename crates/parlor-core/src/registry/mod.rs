//! Connection Registry for presence tracking and delivery.
//!
//! This module provides a thread-safe registry of live connections. Each
//! entry records the owning identity, the rooms the connection has joined
//! and the channel used to deliver frames to it.
//!
//! ## Architecture
//!
//! ```text
//! connection task (alice, C1) <-> ConnectionRegistry <-> connection task (bob, C3)
//!          |                              |                        |
//!          v                              v                        v
//!    mpsc::Sender               DashMap<ConnectionId,         mpsc::Sender
//!                                ConnectionEntry>
//! ```
//!
//! The registry's room sets are the transport-level room membership: joining
//! a room and becoming reachable by that room's broadcasts are one update.
//!
//! Room membership is derived by scanning every connection, so room queries
//! are O(connections). Deployments that outgrow that need a room to
//! connection-id index maintained alongside each entry's room set.

mod connection_registry;

pub use connection_registry::{ConnectionEntry, ConnectionRegistry, ConnectionSnapshot, SendResult};
