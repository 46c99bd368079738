//! # Relay Context
//!
//! Smart context selection: embed the query, over-fetch raw neighbors
//! from the vector store, re-rank by a blend of similarity and recency,
//! and hand back an ordered [`ContextBundle`] ready for prompt assembly.
//!
//! ## Ranking
//!
//! ```text
//! blended = similarity * (1 - w) + recency * w
//! recency = 0.5 ^ (age_ms / half_life_ms)
//! ```
//!
//! Selection is a pure function of the query, the store state, and the
//! passed-in `now_ms` timestamp, so identical inputs always produce the
//! same bundle.
//!
//! Retrieval never fails a request: any embedder or store error degrades
//! to an empty bundle and the caller proceeds with no-context completion.

mod bundle;
mod selector;

pub use bundle::{ContextBundle, ContextHit};
pub use selector::{ContextSelector, SelectorConfig};
