use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::agent::InferenceClient;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Uninitialized,
    Probing,
    Connected,
    Disconnected,
}

/// Snapshot of what the UI needs to know about the inference server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub connected: bool,
    pub available_models: Vec<String>,
    pub selected_model: String,
    pub probing: bool,
    pub last_error: Option<String>,
}

impl ConnectionState {
    fn new(default_model: &str) -> Self {
        Self {
            phase: ConnectionPhase::Uninitialized,
            connected: false,
            available_models: Vec::new(),
            selected_model: default_model.to_string(),
            probing: false,
            last_error: None,
        }
    }
}

/// Picks the first model containing `preferred`, else the first model.
/// `None` when the list is empty.
pub fn pick_default_model<'a>(models: &'a [String], preferred: &str) -> Option<&'a str> {
    models
        .iter()
        .find(|m| m.contains(preferred))
        .or_else(|| models.first())
        .map(String::as_str)
}

/// Tracks reachability of the inference server and the model selection.
#[derive(Clone)]
pub struct ConnectionService {
    client: Arc<dyn InferenceClient>,
    preferred_model: String,
    state: Arc<RwLock<ConnectionState>>,
    // Held for the duration of a probe; concurrent rechecks wait on it instead of probing again.
    probe_lock: Arc<Mutex<()>>,
}

impl ConnectionService {
    pub fn new(client: Arc<dyn InferenceClient>, preferred_model: impl Into<String>) -> Self {
        let preferred_model = preferred_model.into();
        Self {
            state: Arc::new(RwLock::new(ConnectionState::new(&preferred_model))),
            client,
            preferred_model,
            probe_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    pub async fn snapshot(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// First activation: probes once if nothing has run yet.
    pub async fn activate(&self) -> ConnectionState {
        if self.state.read().await.phase == ConnectionPhase::Uninitialized {
            return self.recheck().await;
        }
        self.snapshot().await
    }

    /// Re-probes the server. A call made while a probe is in flight waits for
    /// that probe and returns its outcome.
    ///
    /// The probe runs in its own task holding `probe_lock`, so dropping the
    /// caller does not leave the state stuck in `Probing`.
    pub async fn recheck(&self) -> ConnectionState {
        let guard = match self.probe_lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                let _in_flight = self.probe_lock.lock().await;
                return self.snapshot().await;
            }
        };

        {
            let mut state = self.state.write().await;
            state.phase = ConnectionPhase::Probing;
            state.probing = true;
            state.last_error = None;
        }

        let service = self.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let outcome = service.probe().await;
            service.apply_probe_outcome(outcome).await
        });

        match task.await {
            Ok(state) => state,
            Err(e) => {
                error!("Connection probe task failed: {e}");
                self.apply_probe_outcome(Err(format!("Connection probe failed: {e}"))).await
            }
        }
    }

    async fn apply_probe_outcome(&self, outcome: Result<Vec<String>, String>) -> ConnectionState {
        let mut state = self.state.write().await;
        state.probing = false;
        match outcome {
            Ok(models) => {
                if let Some(selected) = pick_default_model(&models, &self.preferred_model) {
                    state.selected_model = selected.to_string();
                }
                info!(
                    "Connected to Ollama at {} ({} model(s), selected '{}')",
                    self.client.base_url(),
                    models.len(),
                    state.selected_model
                );
                state.available_models = models;
                state.connected = true;
                state.phase = ConnectionPhase::Connected;
            }
            Err(message) => {
                warn!("Ollama unavailable: {message}");
                state.available_models.clear();
                state.connected = false;
                state.phase = ConnectionPhase::Disconnected;
                state.last_error = Some(message);
            }
        }
        state.clone()
    }

    async fn probe(&self) -> Result<Vec<String>, String> {
        if !self.client.probe_liveness().await {
            return Err(format!(
                "Cannot connect to Ollama. Please ensure Ollama is running on {}",
                self.client.base_url()
            ));
        }
        self.client.list_models().await.map_err(|e| e.to_string())
    }

    /// Selects `model` if the server reported it; otherwise leaves the state alone.
    pub async fn select_model(&self, model: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if !state.available_models.iter().any(|m| m == model) {
            return Err(AppError::ModelUnavailable { model: model.to_string() });
        }
        state.selected_model = model.to_string();
        info!("Selected model '{model}'");
        Ok(())
    }

    /// Generation capability handed to the conversation session.
    pub async fn generate(&self, prompt: String) -> Result<String, AppError> {
        let model = {
            let state = self.state.read().await;
            if !state.connected {
                return Err(AppError::NotConnected);
            }
            state.selected_model.clone()
        };
        self.client.generate(&model, &prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted inference server.
    struct FakeClient {
        alive: bool,
        models: Result<Vec<String>, u16>,
        probes: AtomicUsize,
        probe_delay: Duration,
    }

    impl FakeClient {
        fn new(alive: bool, models: Result<Vec<&str>, u16>) -> Self {
            Self {
                alive,
                models: models.map(|m| m.into_iter().map(String::from).collect()),
                probes: AtomicUsize::new(0),
                probe_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl InferenceClient for FakeClient {
        async fn probe_liveness(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if !self.probe_delay.is_zero() {
                tokio::time::sleep(self.probe_delay).await;
            }
            self.alive
        }

        async fn list_models(&self) -> Result<Vec<String>, AppError> {
            self.models
                .clone()
                .map_err(|status| AppError::HttpStatus { operation: "list models", status })
        }

        async fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
            Ok(format!("{model}:{prompt}"))
        }

        fn base_url(&self) -> &str {
            "http://localhost:11434"
        }
    }

    fn service(client: FakeClient) -> (ConnectionService, Arc<FakeClient>) {
        let client = Arc::new(client);
        (ConnectionService::new(client.clone(), "llama3.2:3b"), client)
    }

    #[test]
    fn default_model_prefers_token_then_first() {
        let with_token: Vec<String> = ["a", "b", "llama3.2:3b"].map(String::from).into();
        assert_eq!(pick_default_model(&with_token, "llama3.2:3b"), Some("llama3.2:3b"));

        let without: Vec<String> = ["a", "b"].map(String::from).into();
        assert_eq!(pick_default_model(&without, "llama3.2:3b"), Some("a"));

        let tagged: Vec<String> = ["x", "library/llama3.2:3b-instruct"].map(String::from).into();
        assert_eq!(
            pick_default_model(&tagged, "llama3.2:3b"),
            Some("library/llama3.2:3b-instruct")
        );

        assert_eq!(pick_default_model(&[], "llama3.2:3b"), None);
    }

    #[tokio::test]
    async fn starts_uninitialized_with_default_selection() {
        let (svc, client) = service(FakeClient::new(true, Ok(vec!["m1"])));
        let state = svc.snapshot().await;
        assert_eq!(state.phase, ConnectionPhase::Uninitialized);
        assert_eq!(state.selected_model, "llama3.2:3b");
        assert_eq!(client.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_probe_ends_disconnected() {
        let (svc, _) = service(FakeClient::new(false, Ok(vec!["m1"])));
        let state = svc.activate().await;
        assert_eq!(state.phase, ConnectionPhase::Disconnected);
        assert!(!state.connected);
        assert!(!state.probing);
        assert!(state.available_models.is_empty());
        assert!(state.last_error.unwrap().contains("http://localhost:11434"));
    }

    #[tokio::test]
    async fn failed_listing_ends_disconnected() {
        let (svc, _) = service(FakeClient::new(true, Err(500)));
        let state = svc.activate().await;
        assert_eq!(state.phase, ConnectionPhase::Disconnected);
        assert!(state.available_models.is_empty());
        assert_eq!(state.last_error.as_deref(), Some("HTTP error! status: 500"));
    }

    #[tokio::test]
    async fn successful_probe_selects_preferred_model() {
        let (svc, _) = service(FakeClient::new(true, Ok(vec!["a", "b", "llama3.2:3b"])));
        let state = svc.activate().await;
        assert_eq!(state.phase, ConnectionPhase::Connected);
        assert_eq!(state.available_models, ["a", "b", "llama3.2:3b"]);
        assert_eq!(state.selected_model, "llama3.2:3b");
        assert_eq!(state.last_error, None);
    }

    #[tokio::test]
    async fn empty_model_list_keeps_prior_selection() {
        let (svc, _) = service(FakeClient::new(true, Ok(vec![])));
        let state = svc.activate().await;
        assert!(state.connected);
        assert_eq!(state.selected_model, "llama3.2:3b");
    }

    #[tokio::test]
    async fn activate_probes_only_once() {
        let (svc, client) = service(FakeClient::new(true, Ok(vec!["m1"])));
        svc.activate().await;
        svc.activate().await;
        assert_eq!(client.probes.load(Ordering::SeqCst), 1);

        svc.recheck().await;
        assert_eq!(client.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_rechecks_share_one_probe() {
        let mut fake = FakeClient::new(true, Ok(vec!["m1"]));
        fake.probe_delay = Duration::from_millis(50);
        let (svc, client) = service(fake);

        let (a, b) = tokio::join!(svc.recheck(), svc.recheck());
        assert_eq!(client.probes.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(a.phase, ConnectionPhase::Connected);
    }

    #[tokio::test]
    async fn abandoned_recheck_still_finishes_probe() {
        let mut fake = FakeClient::new(true, Ok(vec!["m1"]));
        fake.probe_delay = Duration::from_millis(200);
        let (svc, client) = service(fake);

        let abandoned = tokio::time::timeout(Duration::from_millis(30), svc.recheck()).await;
        assert!(abandoned.is_err());
        assert!(svc.snapshot().await.probing);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let state = svc.snapshot().await;
        assert!(!state.probing);
        assert_eq!(state.phase, ConnectionPhase::Connected);
        assert_eq!(state.available_models, ["m1"]);

        // The lock was released with the task; a new recheck probes again.
        svc.recheck().await;
        assert_eq!(client.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn select_model_requires_membership() {
        let (svc, _) = service(FakeClient::new(true, Ok(vec!["a", "b"])));
        svc.activate().await;

        svc.select_model("b").await.unwrap();
        assert_eq!(svc.snapshot().await.selected_model, "b");

        let err = svc.select_model("zzz").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(svc.snapshot().await.selected_model, "b");
    }

    #[tokio::test]
    async fn generate_uses_selected_model_and_requires_connection() {
        let (svc, _) = service(FakeClient::new(true, Ok(vec!["a", "b"])));
        assert!(matches!(svc.generate("hi".into()).await, Err(AppError::NotConnected)));

        svc.activate().await;
        svc.select_model("b").await.unwrap();
        assert_eq!(svc.generate("hi".into()).await.unwrap(), "b:hi");
    }
}
