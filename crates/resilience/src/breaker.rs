use crate::error::{BreakerError, GuardedError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Configuration for a circuit breaker
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failure fraction over the rolling window that opens the circuit.
    /// The threshold being met (>=) is sufficient to trip.
    pub failure_threshold: f64,

    /// Number of recent call outcomes kept in the rolling window
    pub window_size: usize,

    /// Minimum outcomes sampled before the ratio is meaningful
    pub min_samples: usize,

    /// Cooldown duration while the circuit is open
    pub cooldown: Duration,

    /// Consecutive probe successes required to close from half-open;
    /// also bounds how many probes are admitted at once
    pub half_open_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            window_size: 20,
            min_samples: 5,
            cooldown: Duration::from_secs(30),
            half_open_probes: 3,
        }
    }
}

/// Public-facing circuit state for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Snapshot of a breaker for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub window_failures: usize,
    pub window_samples: usize,
    pub cooldown_remaining_ms: Option<u64>,
    pub half_open_successes: Option<u32>,
}

/// Observer notified on every state transition.
///
/// Called outside the breaker's lock; implementations must be cheap and
/// non-blocking.
pub trait BreakerObserver: Send + Sync {
    fn on_transition(&self, name: &str, from: BreakerState, to: BreakerState);
}

#[derive(Debug, Clone, Copy)]
enum State {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { successes: u32, admitted: u32 },
}

impl State {
    const fn kind(self) -> BreakerState {
        match self {
            Self::Closed => BreakerState::Closed,
            Self::Open { .. } => BreakerState::Open,
            Self::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }
}

struct Inner {
    state: State,
    /// Rolling window of outcomes, `true` = failure
    window: VecDeque<bool>,
    window_failures: usize,
}

impl Inner {
    fn push_outcome(&mut self, failed: bool, window_size: usize) {
        if self.window.len() == window_size {
            if let Some(evicted) = self.window.pop_front() {
                if evicted {
                    self.window_failures -= 1;
                }
            }
        }
        self.window.push_back(failed);
        if failed {
            self.window_failures += 1;
        }
    }

    fn clear_window(&mut self) {
        self.window.clear();
        self.window_failures = 0;
    }
}

/// Circuit breaker state machine for one backend dependency.
///
/// Bookkeeping is O(1) per call under a single mutex; the guarded call
/// itself runs outside the lock.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    observers: Arc<Mutex<Vec<Arc<dyn BreakerObserver>>>>,
}

impl CircuitBreaker {
    /// Create a standalone breaker (registry-owned breakers share an
    /// observer list instead).
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_observers(name, config, Arc::new(Mutex::new(Vec::new())))
    }

    pub(crate) fn with_observers(
        name: impl Into<String>,
        config: BreakerConfig,
        observers: Arc<Mutex<Vec<Arc<dyn BreakerObserver>>>>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                window: VecDeque::new(),
                window_failures: 0,
            }),
            observers,
        }
    }

    /// Breaker name (the backend dependency key)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask for admission.
    ///
    /// Open circuits reject immediately with [`BreakerError::Open`];
    /// an elapsed cooldown moves the circuit to half-open and admits the
    /// call as a probe.
    pub fn try_acquire(&self) -> Result<(), BreakerError> {
        let mut transition = None;
        let result = {
            let mut inner = self.lock();
            match inner.state {
                State::Closed => Ok(()),
                State::Open { opened_at } => {
                    let elapsed = opened_at.elapsed();
                    if elapsed >= self.config.cooldown {
                        inner.state = State::HalfOpen {
                            successes: 0,
                            admitted: 1,
                        };
                        transition = Some((BreakerState::Open, BreakerState::HalfOpen));
                        Ok(())
                    } else {
                        let remaining = self.config.cooldown - elapsed;
                        Err(BreakerError::Open {
                            name: self.name.clone(),
                            retry_after_ms: remaining.as_millis() as u64,
                        })
                    }
                }
                State::HalfOpen {
                    successes,
                    admitted,
                } => {
                    if admitted < self.config.half_open_probes {
                        inner.state = State::HalfOpen {
                            successes,
                            admitted: admitted + 1,
                        };
                        Ok(())
                    } else {
                        // Probe budget spent; wait for outcomes.
                        Err(BreakerError::Open {
                            name: self.name.clone(),
                            retry_after_ms: 0,
                        })
                    }
                }
            }
        };

        if let Some((from, to)) = transition {
            log::info!("circuit `{}` half-open after cooldown", self.name);
            self.notify(from, to);
        }
        result
    }

    /// Record a successful guarded call.
    pub fn record_success(&self) {
        let mut transition = None;
        {
            let mut inner = self.lock();
            match inner.state {
                State::Closed => {
                    inner.push_outcome(false, self.config.window_size);
                    transition = self.check_trip(&mut inner);
                }
                State::HalfOpen { successes, admitted } => {
                    let successes = successes + 1;
                    if successes >= self.config.half_open_probes {
                        inner.state = State::Closed;
                        inner.clear_window();
                        transition = Some((BreakerState::HalfOpen, BreakerState::Closed));
                    } else {
                        inner.state = State::HalfOpen { successes, admitted };
                    }
                }
                // Late result from before the trip; the cooldown decides.
                State::Open { .. } => {}
            }
        }

        if let Some((from, to)) = transition {
            if to == BreakerState::Closed {
                log::info!("circuit `{}` closed after successful probes", self.name);
            }
            self.notify(from, to);
        }
    }

    /// Record a failed guarded call.
    pub fn record_failure(&self) {
        let mut transition = None;
        {
            let mut inner = self.lock();
            match inner.state {
                State::Closed => {
                    inner.push_outcome(true, self.config.window_size);
                    transition = self.check_trip(&mut inner);
                }
                State::HalfOpen { .. } => {
                    inner.state = State::Open {
                        opened_at: Instant::now(),
                    };
                    transition = Some((BreakerState::HalfOpen, BreakerState::Open));
                    log::warn!("circuit `{}` re-opened after probe failure", self.name);
                }
                State::Open { .. } => {}
            }
        }

        if let Some((from, to)) = transition {
            self.notify(from, to);
        }
    }

    /// Run a guarded future: acquire, await, record the outcome.
    ///
    /// Use this when the guarded call is the whole unit of work; callers
    /// whose failure window outlives the call (streaming sessions) use
    /// `try_acquire`/`record_*` directly.
    pub async fn execute<T, E, Fut>(&self, fut: Fut) -> Result<T, GuardedError<E>>
    where
        E: std::error::Error,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(BreakerError::Open { retry_after_ms, .. }) = self.try_acquire() {
            return Err(GuardedError::Open {
                retry_after: Duration::from_millis(retry_after_ms),
            });
        }

        match fut.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(GuardedError::Inner(e))
            }
        }
    }

    /// Current state kind.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.lock().state.kind()
    }

    /// Snapshot for status reporting.
    #[must_use]
    pub fn status(&self) -> BreakerStatus {
        let inner = self.lock();
        let (cooldown_remaining_ms, half_open_successes) = match inner.state {
            State::Closed => (None, None),
            State::Open { opened_at } => {
                let remaining = self.config.cooldown.checked_sub(opened_at.elapsed());
                (remaining.map(|d| d.as_millis() as u64), None)
            }
            State::HalfOpen { successes, .. } => (None, Some(successes)),
        };

        BreakerStatus {
            name: self.name.clone(),
            state: inner.state.kind(),
            window_failures: inner.window_failures,
            window_samples: inner.window.len(),
            cooldown_remaining_ms,
            half_open_successes,
        }
    }

    /// Trip check, applied after every outcome recorded while Closed.
    /// The threshold being met (>=) is sufficient.
    fn check_trip(&self, inner: &mut Inner) -> Option<(BreakerState, BreakerState)> {
        let samples = inner.window.len();
        let failures = inner.window_failures;
        if samples >= self.config.min_samples
            && failures as f64 / samples as f64 >= self.config.failure_threshold
        {
            inner.state = State::Open {
                opened_at: Instant::now(),
            };
            log::warn!(
                "circuit `{}` opened ({failures}/{samples} failures in window)",
                self.name
            );
            return Some((BreakerState::Closed, BreakerState::Open));
        }
        None
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn notify(&self, from: BreakerState, to: BreakerState) {
        let observers = match self.observers.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for observer in observers {
            observer.on_transition(&self.name, from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(threshold: f64, window: usize, min_samples: usize, probes: u32) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            window_size: window,
            min_samples,
            cooldown: Duration::from_millis(0),
            half_open_probes: probes,
        }
    }

    #[test]
    fn test_opens_at_threshold_exactly() {
        // Window 10, threshold 50%: 5 successes then 5 failures is 50%
        // exactly, which is sufficient to trip (>= rule).
        let breaker = CircuitBreaker::new("test", config(0.5, 10, 10, 1));

        for _ in 0..5 {
            breaker.record_success();
        }
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_failures_then_successes_leave_circuit_open() {
        // Window 10, threshold 50%, minimum 5 samples: the 5th failure
        // already trips, and the successes that follow are ignored
        // while open.
        let breaker = CircuitBreaker::new("test", config(0.5, 10, 5, 1));

        for _ in 0..5 {
            breaker.record_failure();
        }
        for _ in 0..5 {
            breaker.record_success();
        }
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_all_failures_trip_at_min_samples() {
        let breaker = CircuitBreaker::new("test", config(0.5, 20, 5, 1));

        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_open_rejects_without_side_effects() {
        let breaker = CircuitBreaker::new(
            "test",
            BreakerConfig {
                cooldown: Duration::from_secs(60),
                ..config(0.5, 10, 2, 1)
            },
        );
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        let err = breaker.try_acquire().unwrap_err();
        let BreakerError::Open { name, retry_after_ms } = err;
        assert_eq!(name, "test");
        assert!(retry_after_ms > 0);
    }

    #[test]
    fn test_half_open_closes_after_consecutive_successes() {
        let breaker = CircuitBreaker::new("test", config(0.5, 10, 2, 2));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        // Zero cooldown: next acquire is a probe.
        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);

        // The failure window was cleared on close.
        assert_eq!(breaker.status().window_samples, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("test", config(0.5, 10, 2, 3));
        breaker.record_failure();
        breaker.record_failure();

        assert!(breaker.try_acquire().is_ok());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_half_open_probe_budget() {
        let breaker = CircuitBreaker::new("test", config(0.5, 10, 2, 2));
        breaker.record_failure();
        breaker.record_failure();

        assert!(breaker.try_acquire().is_ok());
        assert!(breaker.try_acquire().is_ok());
        // Budget spent, outcomes pending.
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn test_window_rolls_over() {
        let breaker = CircuitBreaker::new("test", config(0.6, 4, 4, 1));

        breaker.record_failure();
        breaker.record_failure();
        for _ in 0..4 {
            breaker.record_success();
        }
        // Failures rolled out of the window.
        let status = breaker.status();
        assert_eq!(status.window_failures, 0);
        assert_eq!(status.window_samples, 4);
        assert_eq!(status.state, BreakerState::Closed);
    }

    #[test]
    fn test_observer_sees_transitions() {
        use std::sync::Mutex as StdMutex;

        struct Recorder(StdMutex<Vec<(BreakerState, BreakerState)>>);
        impl BreakerObserver for Recorder {
            fn on_transition(&self, _name: &str, from: BreakerState, to: BreakerState) {
                self.0.lock().unwrap().push((from, to));
            }
        }

        let recorder = Arc::new(Recorder(StdMutex::new(Vec::new())));
        let observers: Arc<Mutex<Vec<Arc<dyn BreakerObserver>>>> =
            Arc::new(Mutex::new(vec![recorder.clone()]));
        let breaker = CircuitBreaker::with_observers("test", config(0.5, 10, 2, 1), observers);

        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.try_acquire().is_ok());
        breaker.record_success();

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (BreakerState::Closed, BreakerState::Open),
                (BreakerState::Open, BreakerState::HalfOpen),
                (BreakerState::HalfOpen, BreakerState::Closed),
            ]
        );
    }

    #[tokio::test]
    async fn test_execute_records_outcomes() {
        #[derive(Debug, thiserror::Error)]
        #[error("boom")]
        struct Boom;

        let breaker = CircuitBreaker::new(
            "test",
            BreakerConfig {
                cooldown: Duration::from_secs(60),
                ..config(0.5, 10, 2, 1)
            },
        );

        let ok: Result<u32, GuardedError<Boom>> = breaker.execute(async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let _ = breaker.execute::<u32, _, _>(async { Err(Boom) }).await;
        let _ = breaker.execute::<u32, _, _>(async { Err(Boom) }).await;

        // 1 success + 2 failures is above 50% with min_samples 2.
        assert_eq!(breaker.state(), BreakerState::Open);
        let rejected = breaker
            .execute::<u32, Boom, _>(async { Ok(1) })
            .await;
        assert!(matches!(rejected, Err(GuardedError::Open { .. })));
    }
}
