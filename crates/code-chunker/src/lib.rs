//! # Relay Code Chunker
//!
//! Splits source text into retrieval-sized chunks along function and class
//! boundaries, so every chunk carries one coherent unit of meaning.
//!
//! ## Architecture
//!
//! ```text
//! Source Code
//!     │
//!     ├──> Language Detection (from extension)
//!     │
//!     ├──> Tree-sitter Parse → top-level declaration boundaries
//!     │
//!     └──> Segment Cutting
//!          ├─> contiguous segments between boundaries (full file coverage)
//!          ├─> oversized segments degrade to line windows with overlap
//!          └─> emit Chunk[] with stable content-derived ids
//! ```
//!
//! Unlike an extractor, the chunker never drops text: the segments between
//! boundaries are kept, so the chunk set always reconstructs the original
//! file. Files in languages without a grammar, and files that fail to parse,
//! fall back to plain line windows instead of raising.
//!
//! ## Example
//!
//! ```rust
//! use relay_code_chunker::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::default());
//!
//! let code = "fn hello() {\n    println!(\"hello\");\n}\n";
//! let chunks = chunker.chunk(code, "example.rs");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].start_line, 1);
//! ```

mod chunker;
mod config;
mod error;
mod language;
mod outline;
mod types;

pub use chunker::Chunker;
pub use config::ChunkerConfig;
pub use error::{ChunkerError, Result};
pub use language::Language;
pub use types::{Chunk, ChunkKind};
