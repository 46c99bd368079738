use serde::Serialize;

/// One selected chunk with its ranking signals
#[derive(Debug, Clone, Serialize)]
pub struct ContextHit {
    /// Owning chunk id
    pub id: String,

    pub source_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: String,

    /// The chunk text
    pub text: String,

    /// Raw cosine similarity to the query
    pub similarity: f32,

    /// Blended similarity/recency score used for ordering
    pub blended_score: f64,

    /// Position in the bundle, 1 = best
    pub rank: usize,
}

/// Ordered, transient result of one context selection.
///
/// Never persisted; assembled per request and dropped with it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextBundle {
    /// Selected chunks, best first
    pub hits: Vec<ContextHit>,

    /// How many raw neighbors were fetched before re-ranking
    pub raw_candidates: usize,
}

impl ContextBundle {
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Render the bundle as prompt context sections, best first.
    #[must_use]
    pub fn prompt_sections(&self) -> Vec<String> {
        self.hits
            .iter()
            .map(|hit| {
                format!(
                    "// {}:{}-{}\n{}",
                    hit.source_path, hit.start_line, hit.end_line, hit.text
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_prompt_sections_carry_location_headers() {
        let bundle = ContextBundle {
            hits: vec![ContextHit {
                id: "a".to_string(),
                source_path: "src/lib.rs".to_string(),
                start_line: 3,
                end_line: 5,
                kind: "function".to_string(),
                text: "fn a() {}".to_string(),
                similarity: 0.9,
                blended_score: 0.9,
                rank: 1,
            }],
            raw_candidates: 3,
        };

        let sections = bundle.prompt_sections();
        assert_eq!(sections, vec!["// src/lib.rs:3-5\nfn a() {}".to_string()]);
    }
}
