//! # Relay Stream
//!
//! Streaming completion sessions: one lightweight task per session
//! drives the backend token stream to the consumer, guarded by the
//! `"completion"` circuit breaker.
//!
//! ## Session lifecycle
//!
//! ```text
//! start_stream ──> breaker admission
//!    │    open? ──> one terminal BackendUnavailable event, session torn down
//!    └──> backend stream ──> forward tokens in arrival order
//!            │ cancel token trips ──> terminal Cancelled, connection dropped
//!            │ idle timeout ──> terminal Timeout (counts as breaker failure)
//!            └ Done ──> terminal Done (counts as breaker success)
//! ```
//!
//! Every terminal path removes the session from the registry exactly
//! once. Cancellation is checked both in the forwarding loop and at the
//! delivery point, so no token is handed to the consumer after `cancel`
//! returns.

mod error;
mod orchestrator;
mod session;

pub use error::StreamError;
pub use orchestrator::{
    SessionOutcome, SessionSnapshot, StreamConfig, StreamObserver, StreamOrchestrator,
};
pub use session::{SessionHandle, StreamEvent};
