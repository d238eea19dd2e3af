//! Chat over WebSocket
//!
//! Each text frame is one JSON event `{"event": .., "data": ..}`. The
//! connection is bound to the identity behind the `token` query parameter.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use parlor_core::{Hub, Identity, OutboundFrame, SessionStore};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::AppState;

/// Create the WebSocket router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// Map a connect token to its identity; missing or unknown tokens are 401.
pub async fn resolve_identity(
    sessions: &dyn SessionStore,
    token: Option<&str>,
) -> Result<Identity, StatusCode> {
    let token = token.filter(|t| !t.is_empty()).ok_or(StatusCode::UNAUTHORIZED)?;
    match sessions.identity_for_token(token).await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) => Err(StatusCode::UNAUTHORIZED),
        Err(e) => {
            error!(error = %e, "Session lookup failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /ws?token=<token>
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let sessions = state.hub.services().sessions.clone();
    let identity = match resolve_identity(sessions.as_ref(), query.token.as_deref()).await {
        Ok(identity) => identity,
        Err(status) => {
            warn!(status = %status, "Rejected WebSocket connection");
            return status.into_response();
        }
    };

    info!(identity = %identity, "WebSocket connection request");
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, identity))
}

/// Drive one connection until either side closes it.
async fn handle_socket(socket: WebSocket, hub: Hub, identity: Identity) {
    let (tx, mut rx) = hub.outbound_channel();
    let connection = match hub.connect(identity.clone(), tx).await {
        Ok(connection) => connection,
        Err(e) => {
            error!(identity = %identity, error = %e, "Failed to register connection");
            return;
        }
    };
    info!(conn = %connection, identity = %identity, "WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Event(event) => {
                    let text = match event.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            error!(error = %e, "Failed to serialize event");
                            continue;
                        }
                    };
                    if let Err(e) = sender.send(Message::Text(text)).await {
                        debug!(error = %e, "Failed to send WebSocket message");
                        break;
                    }
                }
                OutboundFrame::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    debug!(conn = %connection, len = text.len(), "Received WebSocket message");
                    if let Err(e) = hub.dispatch_text(connection, &text).await {
                        if e.is_fatal_to_connection() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(conn = %connection, "Received binary WebSocket message (not supported)");
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    info!(conn = %connection, "WebSocket close requested");
                    break;
                }
                Some(Err(e)) => {
                    warn!(conn = %connection, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    if let Err(e) = hub.disconnect(connection).await {
        warn!(conn = %connection, error = %e, "Disconnect cleanup failed");
    }
    writer.abort();
    info!(conn = %connection, "WebSocket connection closed");
}
