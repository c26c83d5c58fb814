use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::{GenerateRequest, GenerateResponse, TagsResponse};

/// The three operations the chat needs from an inference server.
///
/// Implementors own transport and wire-format details; the connection and
/// session services only see model names, prompts and reply text.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// `true` iff the server answered with a success status. Never fails.
    async fn probe_liveness(&self) -> bool;

    /// Model names in server order.
    async fn list_models(&self) -> Result<Vec<String>, AppError>;

    /// Single-shot, non-streaming generation.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError>;

    /// Base URL used in user-facing messages.
    fn base_url(&self) -> &str;
}

/// [`InferenceClient`] for a local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Checks the status, then decodes the body as `T`.
    async fn decode<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            error!("Ollama {operation} failed with status {status}");
            return Err(AppError::HttpStatus { operation, status: status.as_u16() });
        }

        let body = response.bytes().await.map_err(|e| {
            error!("Ollama {operation}: failed to read body: {e}");
            AppError::transport(operation, &self.base_url, e)
        })?;

        serde_json::from_slice(&body).map_err(|e| {
            error!("Ollama {operation}: unexpected response shape: {e}");
            AppError::parse(operation, e.to_string())
        })
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn probe_liveness(&self) -> bool {
        match self.http.get(self.url("/api/version")).send().await {
            Ok(resp) => {
                let alive = resp.status().is_success();
                if !alive {
                    warn!("Ollama liveness probe returned {}", resp.status());
                }
                alive
            }
            Err(e) => {
                warn!("Ollama liveness probe failed: {e}");
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, AppError> {
        const OPERATION: &str = "list models";

        let response = self
            .http
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| {
                error!("Ollama {OPERATION} request failed: {e}");
                AppError::transport(OPERATION, &self.base_url, e)
            })?;

        let tags: TagsResponse = self.decode(OPERATION, response).await?;

        let mut names: Vec<String> = Vec::with_capacity(tags.models.len());
        for model in tags.models {
            if !names.contains(&model.name) {
                names.push(model.name);
            }
        }
        debug!("Ollama reports {} model(s)", names.len());
        Ok(names)
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        const OPERATION: &str = "generate";

        let request = GenerateRequest { model, prompt, stream: false };
        let response = self
            .http
            .post(self.url("/api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Ollama {OPERATION} request failed for model {model}: {e}");
                AppError::transport(OPERATION, &self.base_url, e)
            })?;

        let reply: GenerateResponse = self.decode(OPERATION, response).await?;
        debug!(
            "Ollama generated {} chars with {model} (done={}, eval_count={:?}, total_duration={:?}ns)",
            reply.response.len(),
            reply.done,
            reply.eval_count,
            reply.total_duration
        );
        Ok(reply.response)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
