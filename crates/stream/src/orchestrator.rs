use crate::error::StreamError;
use crate::session::{SessionHandle, StreamEvent};
use relay_backend::{AiBackend, BackendEvent, CompletionRequest};
use relay_resilience::{BreakerError, CircuitBreaker};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for streaming sessions
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// A session with no token for this long fails with `Timeout`
    pub idle_timeout: Duration,

    /// Capacity of each session's output channel
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            channel_capacity: 64,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    TimedOut,
    Errored,
    /// Rejected at admission; the circuit was open
    Rejected,
}

/// Observer for session telemetry; implementations must be cheap.
pub trait StreamObserver: Send + Sync {
    fn on_session_started(&self, id: &str);
    fn on_token(&self);
    fn on_session_closed(&self, id: &str, outcome: SessionOutcome, duration_ms: f64);
}

/// Snapshot of one active session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub age_ms: u64,
}

struct SessionEntry {
    cancel: CancellationToken,
    started: Instant,
}

/// Drives streaming completion sessions, one task per session.
pub struct StreamOrchestrator {
    backend: Arc<dyn AiBackend>,
    breaker: Arc<CircuitBreaker>,
    config: StreamConfig,
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
    observers: Vec<Arc<dyn StreamObserver>>,
}

impl StreamOrchestrator {
    #[must_use]
    pub fn new(
        backend: Arc<dyn AiBackend>,
        breaker: Arc<CircuitBreaker>,
        config: StreamConfig,
    ) -> Self {
        Self {
            backend,
            breaker,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            observers: Vec::new(),
        }
    }

    /// Attach a telemetry observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StreamObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Start a streaming session.
    ///
    /// Always returns a handle; admission failures surface as a single
    /// terminal [`StreamError::BackendUnavailable`] event on it, with no
    /// network attempt made.
    #[must_use]
    pub fn start_stream(&self, request: CompletionRequest) -> SessionHandle {
        let id = session_id();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let cancel = CancellationToken::new();

        lock_sessions(&self.sessions).insert(
            id.clone(),
            SessionEntry {
                cancel: cancel.clone(),
                started: Instant::now(),
            },
        );
        for observer in &self.observers {
            observer.on_session_started(&id);
        }
        log::debug!("session {id} started");

        let backend = Arc::clone(&self.backend);
        let breaker = Arc::clone(&self.breaker);
        let sessions = Arc::clone(&self.sessions);
        let observers = self.observers.clone();
        let idle_timeout = self.config.idle_timeout;
        let task_id = id.clone();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let outcome =
                drive(backend, breaker, idle_timeout, request, tx, task_cancel, &observers).await;

            // The driving task is the sole state writer; this is the one
            // removal point for every terminal path.
            let entry = lock_sessions(&sessions).remove(&task_id);
            let duration_ms = entry
                .map(|e| e.started.elapsed().as_secs_f64() * 1e3)
                .unwrap_or(0.0);
            for observer in &observers {
                observer.on_session_closed(&task_id, outcome, duration_ms);
            }
            log::debug!("session {task_id} closed ({outcome:?})");
        });

        SessionHandle {
            id,
            events: rx,
            cancel,
            finished: false,
        }
    }

    /// Cancel a session by id.
    ///
    /// Returns `false` when the session is unknown or already terminal.
    /// After this returns, no further token is delivered to the
    /// session's consumer.
    pub fn cancel(&self, session_id: &str) -> bool {
        let sessions = lock_sessions(&self.sessions);
        match sessions.get(session_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Snapshots of all currently active sessions
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionSnapshot> {
        let sessions = lock_sessions(&self.sessions);
        let mut snapshots: Vec<SessionSnapshot> = sessions
            .iter()
            .map(|(id, entry)| SessionSnapshot {
                id: id.clone(),
                age_ms: entry.started.elapsed().as_millis() as u64,
            })
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }
}

/// Forwarding loop for one session. Returns how the session ended; the
/// caller removes the registry entry.
async fn drive(
    backend: Arc<dyn AiBackend>,
    breaker: Arc<CircuitBreaker>,
    idle_timeout: Duration,
    request: CompletionRequest,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    observers: &[Arc<dyn StreamObserver>],
) -> SessionOutcome {
    if let Err(BreakerError::Open { retry_after_ms, .. }) = breaker.try_acquire() {
        let _ = tx
            .send(StreamEvent::Error(StreamError::BackendUnavailable {
                retry_after_ms,
            }))
            .await;
        return SessionOutcome::Rejected;
    }

    let mut events = match backend.stream_complete(&request).await {
        Ok(events) => events,
        Err(e) => {
            breaker.record_failure();
            let _ = tx
                .send(StreamEvent::Error(StreamError::Backend(e.to_string())))
                .await;
            return SessionOutcome::Errored;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Dropping `events` closes the backend connection.
                let _ = tx.send(StreamEvent::Cancelled).await;
                return SessionOutcome::Cancelled;
            }
            next = tokio::time::timeout(idle_timeout, events.recv()) => match next {
                Err(_) => {
                    breaker.record_failure();
                    let _ = tx.send(StreamEvent::Error(StreamError::Timeout)).await;
                    return SessionOutcome::TimedOut;
                }
                Ok(None) => {
                    breaker.record_failure();
                    let _ = tx
                        .send(StreamEvent::Error(StreamError::Backend(
                            "stream ended before completion".to_string(),
                        )))
                        .await;
                    return SessionOutcome::Errored;
                }
                Ok(Some(BackendEvent::Token(token))) => {
                    for observer in observers {
                        observer.on_token();
                    }
                    if tx.send(StreamEvent::Token(token)).await.is_err() {
                        // Consumer dropped the handle; nothing left to
                        // deliver to.
                        return SessionOutcome::Cancelled;
                    }
                }
                Ok(Some(BackendEvent::Done)) => {
                    breaker.record_success();
                    let _ = tx.send(StreamEvent::Done).await;
                    return SessionOutcome::Completed;
                }
                Ok(Some(BackendEvent::Error(e))) => {
                    breaker.record_failure();
                    let _ = tx
                        .send(StreamEvent::Error(StreamError::Backend(e.to_string())))
                        .await;
                    return SessionOutcome::Errored;
                }
            }
        }
    }
}

fn session_id() -> String {
    let mut bytes = [0u8; 16];
    if getrandom::getrandom(&mut bytes).is_err() {
        // Extremely unlikely; fall back to a time-derived id.
        let nanos = Instant::now().elapsed().as_nanos();
        bytes[..16].copy_from_slice(&nanos.to_le_bytes());
    }
    let mut id = String::with_capacity(32);
    for byte in bytes {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

fn lock_sessions(
    sessions: &Mutex<HashMap<String, SessionEntry>>,
) -> std::sync::MutexGuard<'_, HashMap<String, SessionEntry>> {
    match sessions.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
