//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.
//!
//! A client that disconnects mid-request drops the handler future, which
//! drops the open transaction and rolls it back.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Chats
        .route("/chats", post(handlers::chat::create_chat))
        .route(
            "/chats/{id}",
            get(handlers::chat::get_chat).delete(handlers::chat::delete_chat),
        )
        .route("/chats/{id}/members", get(handlers::chat::get_members))
        // Messages
        .route(
            "/messages",
            post(handlers::message::send_message).get(handlers::message::list_recent),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
