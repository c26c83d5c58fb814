use askama::Template;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Form;

use crate::errors::AppError;
use crate::models::{ChatForm, Message};
use crate::service::chat_service::ChatService;
use crate::service::connection::ConnectionPhase;

// ── Template structs ──────────────────────────────────────────────────────────

/// View model for a message, flattened for askama template use.
pub struct MessageView {
    pub id: String,
    pub origin: String,
    pub content: String,
}

impl From<&Message> for MessageView {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.clone(),
            origin: m.origin.as_str().to_string(),
            content: m.content.clone(),
        }
    }
}

pub struct ModelOption {
    pub name: String,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    /// First probe pending or a recheck in flight.
    probing: bool,
    connected: bool,
    generating: bool,
    base_url: String,
    has_error: bool,
    error_message: String,
    models: Vec<ModelOption>,
    selected_model: String,
    messages: Vec<MessageView>,
}

#[derive(Template)]
#[template(path = "chat_turn.html")]
struct ChatTurnTemplate {
    user_message: String,
    assistant_id: String,
    assistant_content: String,
}

#[derive(Template)]
#[template(path = "error_fragment.html")]
struct ErrorFragmentTemplate {
    error_message: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET `/` — full chat page
pub async fn index_handler(State(svc): State<ChatService>) -> impl IntoResponse {
    let state = svc.status().await;
    let messages = svc.session().messages();

    let tmpl = IndexTemplate {
        probing: state.probing || state.phase == ConnectionPhase::Uninitialized,
        connected: state.connected,
        generating: svc.session().is_generating(),
        base_url: svc.connection().base_url().to_string(),
        has_error: state.last_error.is_some(),
        error_message: state.last_error.unwrap_or_default(),
        models: state
            .available_models
            .iter()
            .map(|name| ModelOption {
                selected: *name == state.selected_model,
                name: name.clone(),
            })
            .collect(),
        selected_model: state.selected_model,
        messages: messages.iter().map(MessageView::from).collect(),
    };
    render(tmpl)
}

/// POST `/api/chat` — accepts form data, returns the new turns as an HTML fragment for HTMX
pub async fn chat_handler(State(svc): State<ChatService>, Form(form): Form<ChatForm>) -> Response {
    match svc.chat(&form.message).await {
        Err(err) => error_response(&err),
        // Conversation was cleared while waiting; nothing to append.
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Ok(Some(reply)) => render(ChatTurnTemplate {
            user_message: form.message,
            assistant_id: reply.id,
            assistant_content: reply.content,
        })
        .into_response(),
    }
}

// ── Helper ────────────────────────────────────────────────────────────────────

pub fn error_status(err: &AppError) -> StatusCode {
    if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_busy() {
        StatusCode::CONFLICT
    } else if err.is_agent_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else if matches!(err, AppError::TaskFailed(_)) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_GATEWAY
    }
}

fn error_response(err: &AppError) -> Response {
    let status = error_status(err);
    let tmpl = ErrorFragmentTemplate { error_message: err.to_string() };
    match tmpl.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(_) => (status, err.to_string()).into_response(),
    }
}

fn render(tmpl: impl Template) -> Response {
    match tmpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Template error: {e}"),
        )
            .into_response(),
    }
}
