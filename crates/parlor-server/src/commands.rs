//! Chat commands shipped with the server.

use std::sync::Arc;

use async_trait::async_trait;
use parlor_core::{ChatCommand, CommandContext, CoreError, HubBuilder};
use tracing::debug;

/// Register the server's commands on top of the core built-ins.
pub fn register(builder: &mut HubBuilder) -> Result<(), CoreError> {
    builder.register_command(MeCommand::NAME, Arc::new(MeCommand))?;
    Ok(())
}

/// `/me <action>`: announce an action to the whole room.
pub struct MeCommand;

impl MeCommand {
    pub const NAME: &'static str = "me";
    const USAGE: &'static str = "Usage: /me <action>";
}

#[async_trait]
impl ChatCommand for MeCommand {
    async fn run(&self, ctx: &CommandContext<'_>, args: &[String]) -> Result<(), CoreError> {
        let room = match ctx.room_name {
            Some(room) if !args.is_empty() => room,
            _ => {
                ctx.reply(Self::USAGE);
                return Ok(());
            }
        };

        let text = format!("{} {}", ctx.identity, args.join(" "));
        let emitter = &ctx.services.emitter;
        let delivered = emitter.room_broadcast(room, emitter.notification(&text, Some(room)));
        debug!(identity = %ctx.identity, room = %room, delivered, "/me broadcast");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::{HubConfig, Identity, MemorySessionStore, OutboundFrame, ServerEvent};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn hub() -> parlor_core::Hub {
        let mut builder = HubBuilder::new(Arc::new(MemorySessionStore::new())).config(HubConfig {
            single_session: false,
            ..HubConfig::default()
        });
        register(&mut builder).unwrap();
        builder.build()
    }

    fn notification_texts(rx: &mut mpsc::Receiver<OutboundFrame>) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let OutboundFrame::Event(ServerEvent::Notification(n)) = frame {
                texts.push(n.message);
            }
        }
        texts
    }

    async fn say(hub: &parlor_core::Hub, conn: parlor_core::ConnectionId, room: &str, body: &str) {
        let frame = json!({ "event": "message", "data": { "roomName": room, "message": body } });
        hub.dispatch_text(conn, &frame.to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_me_broadcasts_to_room() {
        let hub = hub();
        let (alice_tx, mut alice_rx) = hub.outbound_channel();
        let (bob_tx, mut bob_rx) = hub.outbound_channel();
        let alice = hub.connect(Identity::new("alice"), alice_tx).await.unwrap();
        let bob = hub.connect(Identity::new("bob"), bob_tx).await.unwrap();
        hub.presence().join(alice, "lobby").await.unwrap();
        hub.presence().join(bob, "lobby").await.unwrap();
        notification_texts(&mut alice_rx);
        notification_texts(&mut bob_rx);

        say(&hub, alice, "lobby", "/me waves hello").await;

        assert_eq!(notification_texts(&mut bob_rx), vec!["alice waves hello"]);
        assert_eq!(notification_texts(&mut alice_rx), vec!["alice waves hello"]);
    }

    #[tokio::test]
    async fn test_me_without_action_replies_usage() {
        let hub = hub();
        let (tx, mut rx) = hub.outbound_channel();
        let alice = hub.connect(Identity::new("alice"), tx).await.unwrap();

        say(&hub, alice, "lobby", "/me").await;

        // Notifications are entity-encoded by the default sanitizer
        assert_eq!(
            notification_texts(&mut rx),
            vec!["Usage: &#x2F;me &lt;action&gt;"]
        );
    }

    #[tokio::test]
    async fn test_me_is_listed() {
        let hub = hub();
        let (tx, mut rx) = hub.outbound_channel();
        let alice = hub.connect(Identity::new("alice"), tx).await.unwrap();

        say(&hub, alice, "lobby", "/listCommands").await;

        assert_eq!(
            notification_texts(&mut rx),
            vec!["Available commands: listCommands, me."]
        );
    }

    #[test]
    fn test_register_twice_fails() {
        let mut builder = HubBuilder::new(Arc::new(MemorySessionStore::new()));
        register(&mut builder).unwrap();
        assert!(register(&mut builder).is_err());
    }
}
