//! Core transport event handlers.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::commands::{parse_command, CommandContext};
use super::{EventContext, EventHandler};
use crate::error::CoreError;
use crate::hub::HubEvent;
use crate::presence::LeaveOutcome;
use crate::protocol::{decode_payload, require, MessagePayload, RoomPayload};

/// `subscribe {roomName}`: join a room and remember it in the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeHandler;

#[async_trait]
impl EventHandler for SubscribeHandler {
    async fn handle(&self, ctx: &EventContext<'_>, data: &Value) -> Result<(), CoreError> {
        let payload: RoomPayload = decode_payload(ctx.event, data)?;
        let room = require(ctx.event, "roomName", &payload.room_name)?;

        let outcome = ctx.services.presence.join(ctx.connection, room).await?;
        ctx.services.sessions.add_room(&ctx.identity, room).await?;

        ctx.services.publish(HubEvent::Subscribed {
            connection: ctx.connection,
            identity: ctx.identity.clone(),
            room_name: room.to_string(),
            outcome,
        });
        info!(identity = %ctx.identity, room = %room, "subscribe event handled");
        Ok(())
    }
}

/// `unsubscribe {roomName}`: leave a room, dropping it from the session once
/// the identity's last connection has left.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsubscribeHandler;

#[async_trait]
impl EventHandler for UnsubscribeHandler {
    async fn handle(&self, ctx: &EventContext<'_>, data: &Value) -> Result<(), CoreError> {
        let payload: RoomPayload = decode_payload(ctx.event, data)?;
        let room = require(ctx.event, "roomName", &payload.room_name)?;

        let outcome = ctx.services.presence.leave(ctx.connection, room).await?;
        if outcome == LeaveOutcome::Left {
            ctx.services.sessions.remove_room(&ctx.identity, room).await?;
        }

        ctx.services.publish(HubEvent::Unsubscribed {
            connection: ctx.connection,
            identity: ctx.identity.clone(),
            room_name: room.to_string(),
            outcome,
        });
        info!(identity = %ctx.identity, room = %room, "unsubscribe event handled");
        Ok(())
    }
}

/// `message {roomName, message}`: relay to the room, or run a slash command.
///
/// Room membership of the sender is not checked; naming the room is enough.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageHandler;

#[async_trait]
impl EventHandler for MessageHandler {
    async fn handle(&self, ctx: &EventContext<'_>, data: &Value) -> Result<(), CoreError> {
        let payload: MessagePayload = decode_payload(ctx.event, data)?;
        let room = require(ctx.event, "roomName", &payload.room_name)?;
        let body = payload
            .message
            .as_deref()
            .ok_or_else(|| CoreError::malformed(ctx.event, "missing message"))?;

        if let Some((name, args)) = parse_command(body) {
            let command_ctx = CommandContext {
                services: ctx.services,
                connection: ctx.connection,
                identity: &ctx.identity,
                room_name: Some(room),
            };
            return ctx
                .services
                .commands
                .execute(&command_ctx, name, &args)
                .await;
        }

        let delivered = ctx
            .services
            .emitter
            .send_room_message(ctx.connection, room, &ctx.identity, body);
        debug!(identity = %ctx.identity, room = %room, delivered, "message event handled");
        Ok(())
    }
}

/// `userList {roomName}`: send the deduplicated member list to the requester.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserListHandler;

#[async_trait]
impl EventHandler for UserListHandler {
    async fn handle(&self, ctx: &EventContext<'_>, data: &Value) -> Result<(), CoreError> {
        let payload: RoomPayload = decode_payload(ctx.event, data)?;
        let room = require(ctx.event, "roomName", &payload.room_name)?;

        let users = ctx.services.presence.user_list(room);
        ctx.services.emitter.send_user_list(ctx.connection, room, users);
        debug!(identity = %ctx.identity, room = %room, "userList event handled");
        Ok(())
    }
}

/// `disconnect`: leave every joined room, then unregister the connection.
///
/// The session room list is left alone so a reconnect restores it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectHandler;

#[async_trait]
impl EventHandler for DisconnectHandler {
    async fn handle(&self, ctx: &EventContext<'_>, _data: &Value) -> Result<(), CoreError> {
        let outcomes = ctx.services.presence.disconnect(ctx.connection).await?;

        ctx.services.publish(HubEvent::Disconnected {
            connection: ctx.connection,
            identity: ctx.identity.clone(),
            rooms: outcomes.into_iter().map(|(room, _)| room).collect(),
        });
        info!(identity = %ctx.identity, "disconnect event handled");
        Ok(())
    }
}
