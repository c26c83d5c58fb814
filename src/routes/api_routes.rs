use axum::extract::State;
use axum::response::{Html, IntoResponse, Response};
use axum::{Form, Json};

use crate::models::SelectModelForm;
use crate::routes::chat_routes::error_status;
use crate::service::chat_service::ChatService;

/// GET `/api/status` — connection state as JSON
pub async fn status_handler(State(svc): State<ChatService>) -> impl IntoResponse {
    Json(svc.status().await)
}

/// POST `/api/connection/recheck` — re-probe the inference server
pub async fn recheck_handler(State(svc): State<ChatService>) -> impl IntoResponse {
    Json(svc.connection().recheck().await)
}

/// POST `/api/model` — select one of the reported models
pub async fn select_model_handler(
    State(svc): State<ChatService>,
    Form(form): Form<SelectModelForm>,
) -> Response {
    match svc.connection().select_model(form.model.trim()).await {
        Ok(()) => Json(svc.status().await).into_response(),
        Err(e) => (error_status(&e), e.to_string()).into_response(),
    }
}

/// GET `/api/messages` — the transcript as JSON
pub async fn list_messages_handler(State(svc): State<ChatService>) -> impl IntoResponse {
    Json(svc.session().messages())
}

/// POST `/api/clear` — empty the transcript; the empty fragment clears `#messages`
pub async fn clear_handler(State(svc): State<ChatService>) -> impl IntoResponse {
    svc.clear();
    Html("")
}
