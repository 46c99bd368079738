//! # Relay Vector Store
//!
//! In-memory similarity index with durable write-through persistence.
//!
//! ## Architecture
//!
//! ```text
//! upsert/delete ──> op-log append (JSONL) ──> sharded in-memory map
//!                                                  │
//! query(vector, k) ──> per-shard scan ──> merge ──> top-k (score desc, id asc)
//! ```
//!
//! Records live in independent `RwLock` shards keyed by id hash, so
//! concurrent readers proceed freely and unrelated upserts never share a
//! write lock. Similarity is the dot product over normalized vectors
//! (callers normalize at embedding time), which equals cosine similarity.
//!
//! Durability is an append-only op-log replayed and compacted on open.
//! A failed log write halts all further writes to the store until it is
//! reopened; queries keep working off the in-memory state.

mod error;
mod oplog;
mod store;
mod types;

pub use error::{Result, StoreError};
pub use store::VectorStore;
pub use types::{RecordFilter, RecordMetadata, SearchHit, VectorRecord};
