//! Datachat server library: config, logging, routes and the streaming relay.

pub mod config;
pub mod logging;
pub mod relay;
pub mod routes;
pub mod state;
pub mod websocket;

use axum::{
    routing::{delete, get, post},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Session management
        .route("/sessions", get(routes::sessions::list))
        .route("/sessions", post(routes::sessions::create))
        .route("/sessions/{id}", delete(routes::sessions::delete))
        .route("/sessions/{id}/messages", get(routes::sessions::list_messages))
        // File binding
        .route("/sessions/{id}/file", get(routes::files::get_file))
        .route("/sessions/{id}/file", post(routes::files::upload))
        .route("/sessions/{id}/file/preview", get(routes::files::preview))
        .route("/health", get(routes::health));

    let ws_routes = Router::new().route("/chat", get(routes::ws::upgrade));

    Router::new()
        .nest("/api", api_routes)
        .nest("/ws", ws_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
