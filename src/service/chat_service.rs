use std::sync::Arc;

use tracing::error;

use crate::agent::InferenceClient;
use crate::errors::AppError;
use crate::models::Message;
use crate::service::connection::{ConnectionService, ConnectionState};
use crate::service::session::ConversationSession;

/// Application state shared by the HTTP handlers: one connection, one conversation.
#[derive(Clone)]
pub struct ChatService {
    connection: ConnectionService,
    session: ConversationSession,
}

impl ChatService {
    pub fn new(client: Arc<dyn InferenceClient>, default_model: &str) -> Self {
        Self {
            connection: ConnectionService::new(client, default_model),
            session: ConversationSession::new(),
        }
    }

    pub fn connection(&self) -> &ConnectionService {
        &self.connection
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub async fn status(&self) -> ConnectionState {
        self.connection.snapshot().await
    }

    /// Submits `message` and returns the assistant turn it produced.
    /// `Ok(None)` when the conversation was cleared before the reply arrived.
    ///
    /// The turn runs on its own task: if the caller goes away, the request
    /// still completes and its reply (or `Error: ` turn) is still recorded.
    pub async fn chat(&self, message: &str) -> Result<Option<Message>, AppError> {
        if message.trim().is_empty() {
            return Err(AppError::EmptyField { field_name: "message".to_string() });
        }

        let session = self.session.clone();
        let connection = self.connection.clone();
        let text = message.to_string();
        let turn = tokio::spawn(async move {
            session
                .submit(&text, move |prompt| async move { connection.generate(prompt).await })
                .await
        });

        turn.await.map_err(|e| {
            error!("Chat turn task failed: {e}");
            AppError::TaskFailed(e.to_string())
        })?
    }

    pub fn clear(&self) {
        self.session.clear();
    }
}
