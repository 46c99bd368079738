//! # Relay Embedder
//!
//! Turns text into fixed-length vectors via the AI backend, guarded by
//! the `"embeddings"` circuit breaker.
//!
//! ## Contract
//!
//! - Vectors are **L2-normalized at creation time**; every consumer may
//!   compare them with a plain dot product.
//! - `embed_batch` is order-preserving and fails per item: a batch that
//!   fails transiently is degraded to singleton retries so one poisoned
//!   input cannot fail its neighbors.
//! - A vector of the wrong length is a fatal
//!   [`EmbedError::DimensionMismatch`], surfaced immediately and never
//!   retried.
//!
//! Repeated embeddings of identical text are served from an LRU cache
//! keyed by content digest, so they are deterministic and free.

mod embedder;
mod error;

pub use embedder::{Embedder, EmbedderConfig, EmbedderObserver};
pub use error::{EmbedError, Result};
