//! # Relay Resilience
//!
//! Circuit breaker infrastructure guarding calls to the AI backend.
//!
//! ## State machine
//!
//! ```text
//! Closed ──(failure ratio over rolling window >= threshold)──> Open
//! Open ──(cooldown elapses)──> HalfOpen
//! HalfOpen ──(consecutive probe successes)──> Closed
//! HalfOpen ──(any probe failure)──> Open (cooldown restarts)
//! ```
//!
//! One breaker per logical backend dependency (`"embeddings"`,
//! `"completion"`), owned by a [`BreakerRegistry`] that is injected into
//! callers. Distinct keys never share a lock, so a degraded embedding
//! backend cannot stall completion admission control.
//!
//! ## Example
//!
//! ```rust
//! use relay_resilience::{BreakerConfig, BreakerRegistry};
//!
//! let registry = BreakerRegistry::new(BreakerConfig::default());
//! let breaker = registry.handle("completion");
//! if breaker.try_acquire().is_ok() {
//!     // ... call the backend ...
//!     breaker.record_success();
//! }
//! ```

mod breaker;
mod error;
mod registry;

pub use breaker::{
    BreakerConfig, BreakerObserver, BreakerState, BreakerStatus, CircuitBreaker,
};
pub use error::{BreakerError, GuardedError};
pub use registry::BreakerRegistry;
