use std::sync::Arc;

use tracing::info;

use ollama_chat::agent::OllamaClient;
use ollama_chat::config::AppConfig;
use ollama_chat::routes::router;
use ollama_chat::service::chat_service::ChatService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present, so RUST_LOG from it applies too
    dotenvy::dotenv().ok();

    // Initialise tracing before anything that may log
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ollama_chat=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env();

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let client = OllamaClient::new(&config)?;
    let chat_service = ChatService::new(Arc::new(client), &config.default_model);

    // First probe runs in the background so the page is served immediately.
    let connection = chat_service.connection().clone();
    tokio::spawn(async move {
        connection.activate().await;
    });

    // ── Listen ────────────────────────────────────────────────────────────────
    let app = router(chat_service);
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/ (Ollama at {})", config.ollama_base_url);

    axum::serve(listener, app).await?;
    Ok(())
}
