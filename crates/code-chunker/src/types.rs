use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A semantically bounded slice of source text, the unit of retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Stable id derived from path, line span, and content digest
    pub id: String,

    /// Source file path
    pub source_path: String,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// The chunk text
    pub text: String,

    /// What kind of declaration opens this chunk
    pub kind: ChunkKind,
}

impl Chunk {
    /// Create a new chunk; the id is computed from the other fields, so an
    /// unchanged chunk always re-chunks to the same id.
    #[must_use]
    pub fn new(
        source_path: String,
        start_line: usize,
        end_line: usize,
        text: String,
        kind: ChunkKind,
    ) -> Self {
        let id = chunk_id(&source_path, start_line, end_line, &text);
        Self {
            id,
            source_path,
            start_line,
            end_line,
            text,
            kind,
        }
    }

    /// Number of lines in this chunk
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Check if chunk contains a specific line
    #[must_use]
    pub const fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

/// Kind of code chunk based on the declaration that opens it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Standalone function or method
    Function,
    /// Class-like declaration (class, struct, enum, trait, impl)
    Class,
    /// Anything between declarations (imports, constants, free text)
    Block,
}

impl ChunkKind {
    /// Human-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Block => "block",
        }
    }
}

fn chunk_id(path: &str, start_line: usize, end_line: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update([0]);
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut short = String::with_capacity(12);
    for byte in &digest[..6] {
        short.push_str(&format!("{byte:02x}"));
    }
    format!("{path}:{start_line}-{end_line}:{short}")
}
