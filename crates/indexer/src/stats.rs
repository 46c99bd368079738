use serde::Serialize;

/// Aggregate outcome of an indexing run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    /// Candidate files the scanner produced
    pub files_seen: usize,

    /// Files actually (re-)indexed
    pub files_indexed: usize,

    /// Files skipped because their content digest was unchanged
    pub files_skipped: usize,

    /// Chunks written to the store
    pub chunks_indexed: usize,

    /// Chunks dropped because their embedding failed
    pub chunks_failed: usize,
}

impl IndexStats {
    pub fn add_file(&mut self, indexed: usize, failed: usize) {
        self.files_indexed += 1;
        self.chunks_indexed += indexed;
        self.chunks_failed += failed;
    }

    pub fn add_skip(&mut self) {
        self.files_skipped += 1;
    }
}
