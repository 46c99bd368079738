use crate::error::Result;
use crate::scanner::FileScanner;
use crate::stats::IndexStats;
use relay_code_chunker::Chunker;
use relay_embedder::Embedder;
use relay_vector_store::{RecordMetadata, VectorRecord, VectorStore};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Outcome of indexing one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Content digest unchanged; nothing written
    Skipped,

    /// File was (re-)indexed
    Indexed { chunks: usize, failed: usize },
}

/// Chunk-embed-store pipeline for a project tree
pub struct ProjectIndexer {
    chunker: Chunker,
    embedder: Arc<Embedder>,
    store: Arc<VectorStore>,
}

impl ProjectIndexer {
    #[must_use]
    pub fn new(chunker: Chunker, embedder: Arc<Embedder>, store: Arc<VectorStore>) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// Index one file's content.
    ///
    /// Skips when the stored file digest matches. Otherwise chunks,
    /// embeds (a chunk whose embedding fails is dropped, the rest of the
    /// file still indexes), upserts the new records, then deletes ids
    /// that no longer correspond to any current chunk. Replacement is
    /// per chunk id, so no two live records ever share an id.
    pub async fn index_file(
        &self,
        path: &str,
        content: &str,
        now_ms: u64,
    ) -> Result<FileOutcome> {
        let digest = file_digest(content);
        if self.store.file_digest(path).as_deref() == Some(digest.as_str()) {
            log::debug!("skipping unchanged file {path}");
            return Ok(FileOutcome::Skipped);
        }

        let chunks = self.chunker.chunk(content, path);
        let current_ids: HashSet<String> = chunks.iter().map(|c| c.id.clone()).collect();

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await;

        let mut indexed = 0usize;
        let mut failed = 0usize;
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let vector = match embedding {
                Ok(vector) => vector,
                Err(e) => {
                    log::warn!("dropping chunk {} ({e})", chunk.id);
                    failed += 1;
                    continue;
                }
            };

            self.store.upsert(VectorRecord {
                id: chunk.id,
                vector,
                metadata: RecordMetadata {
                    source_path: chunk.source_path,
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    kind: chunk.kind.as_str().to_string(),
                    text: chunk.text,
                    file_digest: digest.clone(),
                    indexed_at_ms: now_ms,
                },
            })?;
            indexed += 1;
        }

        // Garbage-collect records whose chunk no longer exists. Ids of
        // chunks that merely failed to embed are current, so a prior
        // good record for the same content survives.
        for stale in self
            .store
            .ids_for_path(path)
            .into_iter()
            .filter(|id| !current_ids.contains(id))
        {
            self.store.delete(&stale)?;
        }

        Ok(FileOutcome::Indexed {
            chunks: indexed,
            failed,
        })
    }

    /// Drop every record belonging to a deleted source file.
    pub fn remove_file(&self, path: &str) -> Result<usize> {
        let ids = self.store.ids_for_path(path);
        let removed = ids.len();
        for id in ids {
            self.store.delete(&id)?;
        }
        if removed > 0 {
            log::info!("removed {removed} records for deleted file {path}");
        }
        Ok(removed)
    }

    /// Scan and index a project directory.
    pub async fn index_directory(&self, root: &Path, now_ms: u64) -> Result<IndexStats> {
        let files = FileScanner::new(root).scan();

        let mut stats = IndexStats {
            files_seen: files.len(),
            ..Default::default()
        };

        for path in files {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    log::warn!("failed to read {} ({e})", path.display());
                    continue;
                }
            };

            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();

            match self.index_file(&rel, &content, now_ms).await? {
                FileOutcome::Skipped => stats.add_skip(),
                FileOutcome::Indexed { chunks, failed } => stats.add_file(chunks, failed),
            }
        }

        log::info!(
            "indexed {} files ({} skipped, {} chunks, {} failed)",
            stats.files_indexed,
            stats.files_skipped,
            stats.chunks_indexed,
            stats.chunks_failed
        );
        Ok(stats)
    }
}

fn file_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
