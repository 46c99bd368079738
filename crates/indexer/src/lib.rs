//! # Relay Indexer
//!
//! Drives the chunk lifecycle: scan source files, chunk them, embed the
//! chunks, and keep the vector store consistent with what is on disk.
//!
//! ## Pipeline
//!
//! ```text
//! FileScanner ──> ProjectIndexer::index_file
//!                    │  digest unchanged? ──> skip
//!                    │  chunk ──> embed (per-item errors skip the chunk)
//!                    │  upsert new records ──> delete stale ids
//!                    └──> IndexStats
//! ```
//!
//! Re-indexing replaces a file's records per chunk id; the store never
//! holds two records for the same chunk id, and re-indexing an unchanged
//! file is a no-op.

mod error;
mod indexer;
mod scanner;
mod stats;

pub use error::{IndexerError, Result};
pub use indexer::{FileOutcome, ProjectIndexer};
pub use scanner::FileScanner;
pub use stats::IndexStats;
