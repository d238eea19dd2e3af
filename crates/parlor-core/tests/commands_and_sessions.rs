//! Slash commands, extension handlers, single-session policy and room restore.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{multi_session_config, test_hub, TestClient};
use parlor_core::{
    ChatCommand, CommandContext, CoreError, EventContext, EventHandler, HubBuilder, HubConfig,
    Identity, MemorySessionStore, OutboundFrame, SessionStore,
};
use serde_json::{json, Value};

struct Shout;

#[async_trait]
impl ChatCommand for Shout {
    async fn run(&self, ctx: &CommandContext<'_>, args: &[String]) -> Result<(), CoreError> {
        let room = ctx.room_name.unwrap_or_default();
        let text = format!("{} shouts {}", ctx.identity, args.join(" ").to_uppercase());
        ctx.services
            .emitter
            .room_broadcast(room, ctx.services.emitter.notification(&text, Some(room)));
        Ok(())
    }
}

struct CountingHandler(Arc<AtomicUsize>);

#[async_trait]
impl EventHandler for CountingHandler {
    async fn handle(&self, _ctx: &EventContext<'_>, _data: &Value) -> Result<(), CoreError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_unknown_command_lists_valid_commands() {
    let (hub, _sessions) = test_hub(multi_session_config());
    let mut alice = TestClient::connect(&hub, "alice").await;
    let mut bob = TestClient::connect(&hub, "bob").await;
    alice.subscribe(&hub, "lobby").await;
    bob.subscribe(&hub, "lobby").await;
    alice.drain();
    bob.drain();

    alice.say(&hub, "lobby", "/unknown").await;

    let notices = alice.notifications();
    assert_eq!(notices.len(), 1);
    assert_eq!(
        notices[0].message,
        "Not a valid command. Valid commands are: listCommands."
    );
    assert_eq!(notices[0].room_name.as_deref(), Some("lobby"));

    // Commands are not relayed to the room
    assert!(bob.drain().is_empty());
}

#[tokio::test]
async fn test_list_commands_includes_registered_commands() {
    let sessions = Arc::new(MemorySessionStore::new());
    let mut builder = HubBuilder::new(sessions).config(multi_session_config());
    builder.register_command("shout", Arc::new(Shout)).unwrap();
    let hub = builder.build();

    let mut alice = TestClient::connect(&hub, "alice").await;
    alice.say(&hub, "lobby", "/listCommands").await;
    assert_eq!(
        alice.notification_texts(),
        vec!["Available commands: listCommands, shout."]
    );

    alice.say(&hub, "lobby", "/nope").await;
    assert_eq!(
        alice.notification_texts(),
        vec!["Not a valid command. Valid commands are: listCommands, shout."]
    );
}

#[tokio::test]
async fn test_registered_command_receives_arguments() {
    let sessions = Arc::new(MemorySessionStore::new());
    let mut builder = HubBuilder::new(sessions).config(multi_session_config());
    builder.register_command("shout", Arc::new(Shout)).unwrap();
    let hub = builder.build();

    let mut alice = TestClient::connect(&hub, "alice").await;
    let mut bob = TestClient::connect(&hub, "bob").await;
    alice.subscribe(&hub, "lobby").await;
    bob.subscribe(&hub, "lobby").await;
    alice.drain();
    bob.drain();

    alice.say(&hub, "lobby", "/shout  hello   there").await;

    assert_eq!(bob.notification_texts(), vec!["alice shouts HELLO THERE"]);
    assert_eq!(alice.notification_texts(), vec!["alice shouts HELLO THERE"]);
}

#[test]
fn test_duplicate_registrations_fail_at_setup() {
    let sessions = Arc::new(MemorySessionStore::new());
    let mut builder = HubBuilder::new(sessions);

    let err = builder
        .register_command("listCommands", Arc::new(Shout))
        .err()
        .unwrap();
    assert!(err.is_configuration_error());

    let counter = Arc::new(AtomicUsize::new(0));
    let err = builder
        .register_handler("message", Arc::new(CountingHandler(counter)))
        .err()
        .unwrap();
    assert!(matches!(err, CoreError::DuplicateHandlerRegistration(_)));
}

#[tokio::test]
async fn test_extension_event_handler() {
    let counter = Arc::new(AtomicUsize::new(0));
    let sessions = Arc::new(MemorySessionStore::new());
    let mut builder = HubBuilder::new(sessions);
    builder
        .register_handler("typing", Arc::new(CountingHandler(counter.clone())))
        .unwrap();
    let hub = builder.build();

    let alice = TestClient::connect(&hub, "alice").await;
    alice.send(&hub, "typing", json!({ "roomName": "lobby" })).await;
    alice.send(&hub, "typing", Value::Null).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_single_session_closes_older_connections() {
    let (hub, _sessions) = test_hub(HubConfig::default());
    let mut bob = TestClient::connect(&hub, "bob").await;
    let mut old = TestClient::connect(&hub, "alice").await;
    bob.subscribe(&hub, "lobby").await;
    old.subscribe(&hub, "lobby").await;
    bob.drain();
    old.drain();

    let mut new = TestClient::connect(&hub, "alice").await;

    let frames = old.drain();
    assert_eq!(frames.len(), 2);
    match frames[0].event() {
        Some(parlor_core::ServerEvent::Notification(n)) => {
            assert_eq!(
                n.message,
                "You have connected in another window, disconnecting."
            );
            assert_eq!(n.room_name, None);
        }
        other => panic!("expected notice, got {:?}", other),
    }
    assert_eq!(frames[1], OutboundFrame::Close);

    // Restored rooms: alice is still present through the old connection
    assert_eq!(new.notification_texts(), vec!["You have rejoined lobby."]);

    // The transport confirms the close later
    hub.disconnect(old.id).await.unwrap();
    assert!(bob.notification_texts().is_empty());
    assert_eq!(hub.registry().connection_count(), 2);
}

#[tokio::test]
async fn test_single_session_disabled_keeps_connections() {
    let (hub, _sessions) = test_hub(multi_session_config());
    let mut first = TestClient::connect(&hub, "alice").await;
    let _second = TestClient::connect(&hub, "alice").await;
    assert!(first.drain().is_empty());
    assert_eq!(
        hub.registry()
            .connections_for_identity(&Identity::new("alice"))
            .len(),
        2
    );
}

#[tokio::test]
async fn test_reconnect_restores_session_rooms() {
    let (hub, sessions) = test_hub(multi_session_config());
    let mut bob = TestClient::connect(&hub, "bob").await;
    bob.subscribe(&hub, "lobby").await;

    let alice = TestClient::connect(&hub, "alice").await;
    alice.subscribe(&hub, "lobby").await;
    alice.subscribe(&hub, "kitchen").await;
    alice.subscribe(&hub, "attic").await;
    alice.unsubscribe(&hub, "attic").await;
    hub.disconnect(alice.id).await.unwrap();

    assert_eq!(
        sessions.rooms(&Identity::new("alice")).await.unwrap(),
        vec!["lobby", "kitchen"]
    );
    bob.drain();

    let mut again = TestClient::connect(&hub, "alice").await;
    assert_eq!(
        again.notification_texts(),
        vec!["You have joined lobby.", "You have joined kitchen."]
    );
    assert_eq!(bob.notification_texts(), vec!["alice has joined lobby."]);
}

#[tokio::test]
async fn test_restore_can_be_disabled() {
    let config = HubConfig {
        restore_rooms: false,
        ..multi_session_config()
    };
    let (hub, sessions) = test_hub(config);
    sessions
        .add_room(&Identity::new("alice"), "lobby")
        .await
        .unwrap();

    let mut alice = TestClient::connect(&hub, "alice").await;
    assert!(alice.drain().is_empty());
    assert!(hub.presence().user_list("lobby").is_empty());
}

#[tokio::test]
async fn test_unsubscribe_keeps_session_room_while_identity_present() {
    let (hub, sessions) = test_hub(multi_session_config());
    let alice = Identity::new("alice");
    let c1 = TestClient::connect(&hub, "alice").await;
    let c2 = TestClient::connect(&hub, "alice").await;
    c1.subscribe(&hub, "lobby").await;
    c2.subscribe(&hub, "lobby").await;

    c1.unsubscribe(&hub, "lobby").await;
    assert!(hub.presence().user_list("lobby").contains(&alice));
    assert_eq!(sessions.rooms(&alice).await.unwrap(), vec!["lobby"]);

    hub.disconnect(c1.id).await.unwrap();
    hub.disconnect(c2.id).await.unwrap();

    let mut again = TestClient::connect(&hub, "alice").await;
    assert_eq!(again.notification_texts(), vec!["You have joined lobby."]);
}

#[tokio::test]
async fn test_last_unsubscribe_drops_session_room() {
    let (hub, sessions) = test_hub(multi_session_config());
    let alice = Identity::new("alice");
    let c1 = TestClient::connect(&hub, "alice").await;
    let c2 = TestClient::connect(&hub, "alice").await;
    c1.subscribe(&hub, "lobby").await;
    c2.subscribe(&hub, "lobby").await;

    c1.unsubscribe(&hub, "lobby").await;
    c2.unsubscribe(&hub, "lobby").await;
    assert!(sessions.rooms(&alice).await.unwrap().is_empty());
}
