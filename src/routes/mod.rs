pub mod api_routes;
pub mod chat_routes;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::chat_service::ChatService;
use api_routes::{
    clear_handler, list_messages_handler, recheck_handler, select_model_handler, status_handler,
};
use chat_routes::{chat_handler, index_handler};

pub fn router(service: ChatService) -> Router {
    Router::new()
        // Page routes
        .route("/", get(index_handler))
        // API / HTMX routes
        .route("/api/chat", post(chat_handler))
        .route("/api/status", get(status_handler))
        .route("/api/connection/recheck", post(recheck_handler))
        .route("/api/model", post(select_model_handler))
        .route("/api/messages", get(list_messages_handler))
        .route("/api/clear", post(clear_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
