use crate::error::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A streaming completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The user prompt
    pub prompt: String,

    /// Retrieved context sections, most relevant first
    pub context: Vec<String>,
}

impl CompletionRequest {
    /// Request with no retrieved context
    #[must_use]
    pub fn bare(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: Vec::new(),
        }
    }
}

/// One event on a completion stream, in backend arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A piece of generated text
    Token(String),
    /// The backend finished the completion cleanly
    Done,
    /// The backend failed; terminal for this stream
    Error(crate::BackendError),
}

/// The AI backend the core depends on.
///
/// One pluggable implementation per deployment; tests substitute their
/// own fakes.
#[async_trait::async_trait]
pub trait AiBackend: Send + Sync {
    /// Embed a batch of texts, one vector per input, order preserved.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Start a streaming completion.
    ///
    /// Events arrive on the returned channel in the order the backend
    /// produced them. Dropping the receiver cancels the transfer.
    async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<mpsc::Receiver<BackendEvent>>;
}
