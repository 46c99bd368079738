//! # Relay Backend
//!
//! Abstract interface to the generative AI backend, plus the HTTP
//! implementation used in production.
//!
//! The rest of the workspace depends only on the [`AiBackend`] trait:
//! one call for batched embeddings, one for streaming completion. The
//! streaming side hands back an `mpsc::Receiver` of [`BackendEvent`]s;
//! dropping the receiver aborts the transfer and releases the
//! connection.

mod error;
mod http;
mod types;

pub use error::{BackendError, Result};
pub use http::{HttpBackend, HttpBackendConfig};
pub use types::{AiBackend, BackendEvent, CompletionRequest};
