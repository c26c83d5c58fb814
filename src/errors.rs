use thiserror::Error;

/// Top-level application error.
/// All variants carry a human-readable message for display/logging; the
/// conversation session renders that message into the transcript verbatim.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Inference server errors ──────────────────────────────────────────────
    #[error("Cannot connect to Ollama. Please ensure Ollama is running on {base_url}")]
    Transport {
        operation: &'static str,
        base_url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error! status: {status}")]
    HttpStatus { operation: &'static str, status: u16 },

    #[error("Failed to decode {operation} response: {message}")]
    Parse { operation: &'static str, message: String },

    #[error("Not connected to Ollama")]
    NotConnected,

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Model '{model}' is not available")]
    ModelUnavailable { model: String },

    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    // ── Session errors ───────────────────────────────────────────────────────
    #[error("A response is already being generated")]
    GenerationInProgress,

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl AppError {
    pub fn transport(
        operation: &'static str,
        base_url: impl Into<String>,
        source: reqwest::Error,
    ) -> Self {
        AppError::Transport { operation, base_url: base_url.into(), source }
    }

    pub fn parse(operation: &'static str, message: impl Into<String>) -> Self {
        AppError::Parse { operation, message: message.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::ModelUnavailable { .. } | AppError::EmptyField { .. })
    }

    pub fn is_agent_unavailable(&self) -> bool {
        matches!(self, AppError::Transport { .. } | AppError::NotConnected)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, AppError::GenerationInProgress)
    }
}
