use crate::config::ChunkerConfig;
use crate::language::Language;
use crate::outline::{self, Decl};
use crate::types::{Chunk, ChunkKind};

/// Main chunker interface for processing source text
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker with configuration
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        config
            .validate()
            .expect("Invalid chunker configuration provided");
        Self { config }
    }

    /// Split source text into chunks.
    ///
    /// The file is cut at top-level declaration boundaries into contiguous
    /// segments; every line of the input lands in exactly one segment, so
    /// the chunk set reconstructs the file. Segments longer than
    /// `max_chunk_lines`, files in languages without a grammar, and files
    /// that fail to parse degrade to fixed-size line windows with overlap
    /// instead of raising.
    #[must_use]
    pub fn chunk(&self, content: &str, path: &str) -> Vec<Chunk> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let language = Language::from_path(path);
        if language.supports_ast() {
            match outline::declarations(content, language) {
                Ok(decls) => return self.cut_segments(&lines, path, &decls),
                Err(e) => {
                    log::warn!("parse failed for {path}, falling back to line windows: {e}");
                }
            }
        }

        self.window_lines(&lines, path, 1, ChunkKind::Block)
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Cut the file into contiguous segments at declaration boundaries.
    fn cut_segments(&self, lines: &[&str], path: &str, decls: &[Decl]) -> Vec<Chunk> {
        let total = lines.len();
        let mut chunks = Vec::new();
        let mut next_line = 1usize;

        for decl in decls {
            let start = decl.start_line.min(total);
            let end = decl.end_line.min(total);
            if start < next_line {
                continue;
            }

            // The gap between the previous segment and this declaration.
            if start > next_line {
                chunks.extend(self.segment(lines, path, next_line, start - 1, ChunkKind::Block));
            }

            chunks.extend(self.segment(lines, path, start, end, decl.kind));
            next_line = end + 1;
        }

        if next_line <= total {
            chunks.extend(self.segment(lines, path, next_line, total, ChunkKind::Block));
        }

        chunks
    }

    /// Emit one segment, degrading to windows when it is oversized.
    fn segment(
        &self,
        lines: &[&str],
        path: &str,
        start_line: usize,
        end_line: usize,
        kind: ChunkKind,
    ) -> Vec<Chunk> {
        let height = end_line - start_line + 1;
        if height > self.config.max_chunk_lines {
            return self.window_lines(&lines[start_line - 1..end_line], path, start_line, kind);
        }

        vec![Chunk::new(
            path.to_string(),
            start_line,
            end_line,
            lines[start_line - 1..end_line].join("\n"),
            kind,
        )]
    }

    /// Fixed-size sliding windows with overlap over a line range.
    fn window_lines(
        &self,
        lines: &[&str],
        path: &str,
        first_line: usize,
        kind: ChunkKind,
    ) -> Vec<Chunk> {
        let window = self.config.window_lines;
        let step = window - self.config.overlap_lines;

        let mut chunks = Vec::new();
        let mut offset = 0usize;
        loop {
            let end = (offset + window).min(lines.len());
            chunks.push(Chunk::new(
                path.to_string(),
                first_line + offset,
                first_line + end - 1,
                lines[offset..end].join("\n"),
                kind,
            ));
            if end == lines.len() {
                break;
            }
            offset += step;
        }
        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RUST_CODE: &str = "use std::collections::HashMap;\n\n/// Main function\nfn main() {\n    println!(\"Hello, world!\");\n}\n\nstruct Point {\n    x: i32,\n    y: i32,\n}\n";

    #[test]
    fn test_rust_boundaries() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk(RUST_CODE, "test.rs");

        let has_function = chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Function && c.text.contains("fn main"));
        assert!(has_function);

        let has_struct = chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Class && c.text.contains("struct Point"));
        assert!(has_struct);
    }

    #[test]
    fn test_chunks_reconstruct_file() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk(RUST_CODE, "test.rs");

        let rebuilt: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let expected: Vec<&str> = RUST_CODE.lines().collect();
        assert_eq!(rebuilt.join("\n"), expected.join("\n"));
    }

    #[test]
    fn test_chunks_are_contiguous() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk(RUST_CODE, "test.rs");

        assert_eq!(chunks[0].start_line, 1);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_line, pair[0].end_line + 1);
        }
        assert_eq!(
            chunks.last().unwrap().end_line,
            RUST_CODE.lines().count()
        );
    }

    #[test]
    fn test_empty_content_yields_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("", "test.rs").is_empty());
    }

    #[test]
    fn test_unknown_language_uses_windows() {
        let config = ChunkerConfig {
            max_chunk_lines: 40,
            window_lines: 10,
            overlap_lines: 2,
        };
        let chunker = Chunker::new(config);

        let content: String = (1..=25).map(|i| format!("line {i}\n")).collect();
        let chunks = chunker.chunk(&content, "notes.txt");

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Block));
        // Windows step by window - overlap lines.
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 10);
        assert_eq!(chunks[1].start_line, 9);
        assert_eq!(chunks[1].end_line, 18);
        assert_eq!(chunks[2].start_line, 17);
        assert_eq!(chunks[2].end_line, 25);
    }

    #[test]
    fn test_window_overlap_repeats_lines() {
        let config = ChunkerConfig {
            max_chunk_lines: 40,
            window_lines: 4,
            overlap_lines: 1,
        };
        let chunker = Chunker::new(config);

        let content = "a\nb\nc\nd\ne\nf\n";
        let chunks = chunker.chunk(content, "data.cfg");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a\nb\nc\nd");
        assert_eq!(chunks[1].text, "d\ne\nf");
    }

    #[test]
    fn test_oversized_segment_degrades_to_windows() {
        let config = ChunkerConfig {
            max_chunk_lines: 10,
            window_lines: 10,
            overlap_lines: 2,
        };
        let chunker = Chunker::new(config);

        let mut code = String::from("fn big() {\n");
        for i in 0..30 {
            code.push_str(&format!("    let x{i} = {i};\n"));
        }
        code.push_str("}\n");

        let chunks = chunker.chunk(&code, "big.rs");
        assert!(chunks.len() > 1);
        assert!(chunks
            .iter()
            .all(|c| c.end_line - c.start_line + 1 <= 10));
        // All windows come from the one oversized function.
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Function));
    }

    #[test]
    fn test_python_class_is_one_segment() {
        let chunker = Chunker::default();
        let code = "class Thing:\n    def a(self):\n        pass\n\n    def b(self):\n        pass\n";
        let chunks = chunker.chunk(code, "thing.py");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Class);
    }

    #[test]
    fn test_same_input_same_ids() {
        let chunker = Chunker::default();
        let a = chunker.chunk(RUST_CODE, "test.rs");
        let b = chunker.chunk(RUST_CODE, "test.rs");
        let ids_a: Vec<&str> = a.iter().map(|c| c.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
