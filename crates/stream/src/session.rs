use crate::error::StreamError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One event on a session's output channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of generated text, in backend arrival order
    Token(String),

    /// The completion finished cleanly
    Done,

    /// The session was cancelled; a normal terminal state, not an error
    Cancelled,

    /// The session failed; terminal
    Error(StreamError),
}

impl StreamEvent {
    /// Whether this event ends the session
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token(_))
    }
}

/// Consumer side of one streaming session.
///
/// The driving task owns all session state; this handle only observes
/// events and carries the cancellation token.
pub struct SessionHandle {
    pub(crate) id: String,
    pub(crate) events: mpsc::Receiver<StreamEvent>,
    pub(crate) cancel: CancellationToken,
    pub(crate) finished: bool,
}

impl SessionHandle {
    /// Session id, usable with [`crate::StreamOrchestrator::cancel`]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancel this session directly.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next event, or `None` once a terminal event has been delivered.
    ///
    /// Cancellation is checked before the event queue on every call, so
    /// tokens already buffered when `cancel` returns are never
    /// delivered.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }

        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Some(StreamEvent::Cancelled),
            event = self.events.recv() => event,
        };

        match event {
            Some(event) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Some(event)
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Drain the session to completion, concatenating tokens.
    ///
    /// Returns the full text on `Done` and the text so far on
    /// `Cancelled`; stream failures surface as the error.
    pub async fn collect_text(mut self) -> Result<String, StreamError> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Token(token) => text.push_str(&token),
                StreamEvent::Done | StreamEvent::Cancelled => break,
                StreamEvent::Error(e) => return Err(e),
            }
        }
        Ok(text)
    }
}
