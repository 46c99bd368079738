use std::time::Duration;
use thiserror::Error;

/// Errors raised by circuit breaker admission
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakerError {
    /// The circuit is open; no call was attempted
    #[error("Circuit `{name}` is open, retry after {retry_after_ms}ms")]
    Open { name: String, retry_after_ms: u64 },
}

/// Error from a breaker-guarded call
#[derive(Error, Debug)]
pub enum GuardedError<E: std::error::Error> {
    /// The circuit rejected the call without attempting it
    #[error("Circuit open, retry after {retry_after:?}")]
    Open { retry_after: Duration },

    /// The guarded call itself failed (recorded as a breaker failure)
    #[error("Guarded call failed: {0}")]
    Inner(E),
}
