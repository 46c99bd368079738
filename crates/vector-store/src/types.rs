use serde::{Deserialize, Serialize};

/// Typed metadata carried by every stored vector.
///
/// A fixed record rather than a free-form map: every field is validated
/// at ingestion, so similarity math can never be corrupted by a
/// malformed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Source file the chunk came from
    pub source_path: String,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// Chunk kind (function, class, block)
    pub kind: String,

    /// The chunk text itself
    pub text: String,

    /// Content digest of the whole source file at indexing time
    pub file_digest: String,

    /// When the chunk was indexed (unix ms); drives recency ranking
    pub indexed_at_ms: u64,
}

/// One indexed vector with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Owning chunk id
    pub id: String,

    /// Normalized embedding vector
    pub vector: Vec<f32>,

    pub metadata: RecordMetadata,
}

/// A similarity query hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,

    /// Cosine similarity to the query vector
    pub score: f32,
}

/// Optional predicate applied while scanning
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Only records from this source file
    pub source_path: Option<String>,

    /// Only records of this chunk kind
    pub kind: Option<String>,
}

impl RecordFilter {
    #[must_use]
    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        if let Some(path) = &self.source_path {
            if metadata.source_path != *path {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            if metadata.kind != *kind {
                return false;
            }
        }
        true
    }
}
