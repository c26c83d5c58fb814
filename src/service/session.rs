use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info};

use crate::errors::AppError;
use crate::models::Message;

#[derive(Debug, Default)]
struct SessionInner {
    log: Vec<Message>,
    generating: bool,
    /// Bumped by `clear()`; replies to requests issued under an older epoch are dropped.
    epoch: u64,
}

/// In-memory transcript plus the "generating" flag.
///
/// The lock is only taken for short, synchronous sections and never across an
/// await, so the std mutex is sufficient.
#[derive(Clone, Default)]
pub struct ConversationSession {
    inner: Arc<Mutex<SessionInner>>,
}

/// Resets `generating` on every exit path of `submit`, including the future
/// being dropped before the reply arrives. Callers that must not lose the
/// reply run `submit` on a spawned task (see `ChatService::chat`).
struct GeneratingGuard<'a> {
    session: &'a ConversationSession,
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.session.lock().generating = false;
    }
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        // Every critical section leaves the log consistent; ignore poisoning.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().log.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().log.is_empty()
    }

    pub fn is_generating(&self) -> bool {
        self.lock().generating
    }

    /// Empties the transcript. Allowed mid-generation; the pending reply is discarded.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let dropped = inner.log.len();
        inner.log.clear();
        inner.epoch += 1;
        info!("Cleared conversation ({dropped} message(s))");
    }

    /// Appends a user turn, asks `generate` for a reply and appends it (or an
    /// `Error: ` turn) as the assistant.
    ///
    /// Returns `Ok(None)` for blank input or when the session was cleared while
    /// the request was in flight, and `Err(GenerationInProgress)` if another
    /// submission has not finished yet.
    pub async fn submit<F, Fut>(&self, text: &str, generate: F) -> Result<Option<Message>, AppError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String, AppError>>,
    {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let epoch = {
            let mut inner = self.lock();
            if inner.generating {
                return Err(AppError::GenerationInProgress);
            }
            inner.log.push(Message::user(text));
            inner.generating = true;
            inner.epoch
        };
        let _generating = GeneratingGuard { session: self };

        let content = match generate(text.to_string()).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Generation failed: {e}");
                format!("Error: {e}")
            }
        };

        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!("Discarding reply for a cleared conversation");
            return Ok(None);
        }
        let reply = Message::assistant(content);
        inner.log.push(reply.clone());
        Ok(Some(reply))
    }
}
