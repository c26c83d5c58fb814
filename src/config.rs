use std::time::Duration;

use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2:3b";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Runtime configuration, read from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Base URL of the Ollama server, without a trailing slash.
    pub ollama_base_url: String,
    /// Preferred model token. Also the selection used before any model list arrives.
    pub default_model: String,
    /// `None` leaves reqwest's transport defaults in place.
    pub request_timeout: Option<Duration>,
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            request_timeout: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let ollama_base_url = lookup("OLLAMA_API_BASE_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.ollama_base_url);

        let default_model = lookup("OLLAMA_DEFAULT_MODEL")
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or(defaults.default_model);

        let request_timeout = lookup("OLLAMA_REQUEST_TIMEOUT_SECS").and_then(|raw| {
            match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    warn!("Ignoring invalid OLLAMA_REQUEST_TIMEOUT_SECS value '{raw}'");
                    None
                }
            }
        });

        let host = lookup("HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(defaults.host);

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid PORT value '{raw}', using {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            None => defaults.port,
        };

        Self { ollama_base_url, default_model, request_timeout, host, port }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
