use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use parlor_core::{Hub, MemorySessionStore};
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

mod sessions;
mod websocket;

/// Server application state
pub struct AppState {
    /// Chat core shared by every connection
    pub hub: Hub,
    /// Session tokens and persisted room lists
    pub sessions: Arc<MemorySessionStore>,
}

impl AppState {
    pub fn new(hub: Hub, sessions: Arc<MemorySessionStore>) -> Self {
        Self { hub, sessions }
    }
}

/// Start the HTTP server
pub async fn start(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let app = create_router(state);

    info!("Starting Axum HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the Axum router with all routes and middleware
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(sessions::router(state.clone()))
        .merge(websocket::router(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Simple health check endpoint (for load balancers)
async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "parlor-server",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use parlor_core::HubBuilder;
    use tower::ServiceExt;

    pub(crate) fn create_test_state() -> Arc<AppState> {
        let sessions = Arc::new(MemorySessionStore::new());
        let hub = HubBuilder::new(sessions.clone()).build();
        Arc::new(AppState::new(hub, sessions))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "parlor-server");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
