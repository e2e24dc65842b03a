use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;

use super::handlers;
use super::static_files::static_handler;
use super::state::AppState;

// UI Routes - chat page and its assets
pub fn ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::ui::index_handler))
        .route("/static/{*path}", get(static_handler))
}

// API Routes - one resource per chat session
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest(
            "/api",
            Router::new()
                // Session lifecycle
                .route("/sessions", post(handlers::api::create_session))
                .route(
                    "/sessions/{id}",
                    get(handlers::api::get_session).delete(handlers::api::end_session),
                )

                // Credentials
                .route(
                    "/sessions/{id}/service-account",
                    post(handlers::api::upload_service_account),
                )
                .route("/sessions/{id}/api-key", post(handlers::api::set_api_key))

                // Conversation
                .route("/sessions/{id}/messages", post(handlers::api::send_message))
                .route(
                    "/sessions/{id}/history/{index}",
                    post(handlers::api::replay_history),
                )
                .route("/sessions/{id}/clear", post(handlers::api::clear_history))

                // System status
                .route("/status", get(handlers::api::system_status)),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}
