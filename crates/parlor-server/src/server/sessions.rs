//! Development session routes
//!
//! - POST /v1/sessions - Mint a session token for a username
//! - DELETE /v1/sessions/:token - Forget a session token
//!
//! No credentials are checked; a real deployment resolves tokens from its
//! own login flow through the `SessionStore` trait.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
    Json, Router,
};
use parlor_core::Identity;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/sessions", post(create_session_handler))
        .route("/v1/sessions/:token", delete(delete_session_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub username: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

/// POST /v1/sessions
#[instrument(skip(state))]
pub async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let username = request.username.trim();
    if username.is_empty() {
        warn!("Rejected session request with empty username");
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_input", "Username cannot be empty")),
        )
            .into_response();
    }
    if Identity::is_reserved(username) {
        warn!(username = %username, "Rejected session request for reserved username");
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("reserved_username", "Username is reserved")),
        )
            .into_response();
    }

    let token = state.sessions.open_session(Identity::new(username));
    info!(username = %username, "Session opened");

    (
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            username: username.to_string(),
        }),
    )
        .into_response()
}

/// DELETE /v1/sessions/:token
#[instrument(skip(state, token))]
pub async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    match state.sessions.close_session(&token) {
        Some(identity) => {
            info!(identity = %identity, "Session closed");
            StatusCode::NO_CONTENT.into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("session_not_found", "Unknown session token")),
        )
            .into_response(),
    }
}
