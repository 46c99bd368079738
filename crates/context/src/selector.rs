use crate::bundle::{ContextBundle, ContextHit};
use relay_embedder::Embedder;
use relay_vector_store::VectorStore;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Configuration for context selection
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Raw neighbors fetched per requested result, to give the
    /// re-ranker room to reorder
    pub over_fetch_factor: usize,

    /// Recency half-life: a chunk this old contributes half the
    /// recency signal of a fresh one
    pub recency_half_life_ms: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            over_fetch_factor: 3,
            recency_half_life_ms: 7 * 24 * 60 * 60 * 1000,
        }
    }
}

/// Similarity-driven context selection over the vector store
pub struct ContextSelector {
    embedder: Arc<Embedder>,
    store: Arc<VectorStore>,
    config: SelectorConfig,
}

impl ContextSelector {
    #[must_use]
    pub fn new(embedder: Arc<Embedder>, store: Arc<VectorStore>, config: SelectorConfig) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Select the top `k` chunks for a query.
    ///
    /// `recency_weight` in [0, 1] shifts ranking from pure similarity
    /// (0) to pure recency (1); out-of-range values are clamped.
    /// `now_ms` anchors the recency decay, keeping selection a pure
    /// function of its inputs.
    ///
    /// Degrades to an empty bundle on any retrieval error; completion
    /// can still proceed without context.
    pub async fn select(
        &self,
        query: &str,
        k: usize,
        recency_weight: f64,
        now_ms: u64,
    ) -> ContextBundle {
        if k == 0 {
            return ContextBundle::default();
        }
        let weight = recency_weight.clamp(0.0, 1.0);

        let query_vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                log::warn!("query embedding failed, returning empty context: {e}");
                return ContextBundle::default();
            }
        };

        let over_fetch = self.config.over_fetch_factor.max(1) * k;
        let raw = match self.store.query(&query_vector, over_fetch, None) {
            Ok(hits) => hits,
            Err(e) => {
                log::warn!("store query failed, returning empty context: {e}");
                return ContextBundle::default();
            }
        };
        let raw_candidates = raw.len();

        let mut scored: Vec<ContextHit> = raw
            .into_iter()
            .filter_map(|hit| {
                // A record deleted between query and fetch just drops out.
                let record = self.store.get(&hit.id)?;
                let age_ms = now_ms.saturating_sub(record.metadata.indexed_at_ms);
                let recency = recency_factor(age_ms, self.config.recency_half_life_ms);
                let blended = f64::from(hit.score) * (1.0 - weight) + recency * weight;
                Some(ContextHit {
                    id: record.id,
                    source_path: record.metadata.source_path,
                    start_line: record.metadata.start_line,
                    end_line: record.metadata.end_line,
                    kind: record.metadata.kind,
                    text: record.metadata.text,
                    similarity: hit.score,
                    blended_score: blended,
                    rank: 0,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.blended_score
                .partial_cmp(&a.blended_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        for (i, hit) in scored.iter_mut().enumerate() {
            hit.rank = i + 1;
        }

        ContextBundle {
            hits: scored,
            raw_candidates,
        }
    }

    /// [`select`](Self::select) anchored at the current wall clock.
    pub async fn select_now(&self, query: &str, k: usize, recency_weight: f64) -> ContextBundle {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.select(query, k, recency_weight, now_ms).await
    }
}

/// Exponential decay: 1.0 for a fresh chunk, 0.5 at one half-life.
fn recency_factor(age_ms: u64, half_life_ms: u64) -> f64 {
    0.5f64.powf(age_ms as f64 / half_life_ms.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use relay_backend::{AiBackend, BackendError, BackendEvent, CompletionRequest};
    use relay_embedder::EmbedderConfig;
    use relay_resilience::{BreakerConfig, BreakerRegistry};
    use relay_vector_store::{RecordMetadata, VectorRecord};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    const DIMS: usize = 4;

    /// Fake backend with pinned query vectors
    struct PinnedBackend {
        vectors: HashMap<String, Vec<f32>>,
        fail: AtomicBool,
    }

    impl PinnedBackend {
        fn new(vectors: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: vectors
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl AiBackend for PinnedBackend {
        async fn embed(&self, texts: &[String]) -> relay_backend::Result<Vec<Vec<f32>>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(BackendError::transient("embedding backend down"));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    self.vectors
                        .get(t)
                        .cloned()
                        .unwrap_or_else(|| vec![1.0, 0.0, 0.0, 0.0])
                })
                .collect())
        }

        async fn stream_complete(
            &self,
            _request: &CompletionRequest,
        ) -> relay_backend::Result<mpsc::Receiver<BackendEvent>> {
            Err(BackendError::transient("not a completion backend"))
        }
    }

    fn record(id: &str, vector: Vec<f32>, indexed_at_ms: u64) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            metadata: RecordMetadata {
                source_path: format!("{id}.rs"),
                start_line: 1,
                end_line: 3,
                kind: "function".to_string(),
                text: format!("fn {id}() {{}}"),
                file_digest: "d".to_string(),
                indexed_at_ms,
            },
        }
    }

    fn selector_with(
        backend: PinnedBackend,
        store: Arc<VectorStore>,
        config: SelectorConfig,
    ) -> ContextSelector {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let embedder = Arc::new(Embedder::new(
            Arc::new(backend),
            registry.handle("embeddings"),
            EmbedderConfig {
                dims: DIMS,
                max_batch_size: 16,
                cache_capacity: 64,
            },
        ));
        ContextSelector::new(embedder, store, config)
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_bundle() {
        let store = Arc::new(VectorStore::in_memory(DIMS));
        let selector = selector_with(
            PinnedBackend::new(&[]),
            store,
            SelectorConfig::default(),
        );

        let bundle = selector.select("anything", 5, 0.0, 0).await;
        assert!(bundle.is_empty());
        assert_eq!(bundle.raw_candidates, 0);
    }

    #[tokio::test]
    async fn test_pure_similarity_ranking() {
        let store = Arc::new(VectorStore::in_memory(DIMS));
        store.upsert(record("exact", vec![1.0, 0.0, 0.0, 0.0], 0)).unwrap();
        store.upsert(record("near", vec![0.8, 0.6, 0.0, 0.0], 0)).unwrap();
        store.upsert(record("far", vec![0.0, 0.0, 1.0, 0.0], 0)).unwrap();

        let backend = PinnedBackend::new(&[("query", vec![1.0, 0.0, 0.0, 0.0])]);
        let selector = selector_with(backend, store, SelectorConfig::default());

        let bundle = selector.select("query", 2, 0.0, 0).await;
        let ids: Vec<&str> = bundle.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
        assert_eq!(bundle.hits[0].rank, 1);
        assert_eq!(bundle.hits[1].rank, 2);
        assert!((bundle.hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_full_recency_weight_prefers_newest() {
        let store = Arc::new(VectorStore::in_memory(DIMS));
        // Same similarity, different ages.
        store.upsert(record("old", vec![1.0, 0.0, 0.0, 0.0], 0)).unwrap();
        store.upsert(record("new", vec![1.0, 0.0, 0.0, 0.0], 9_000)).unwrap();

        let backend = PinnedBackend::new(&[("query", vec![1.0, 0.0, 0.0, 0.0])]);
        let selector = selector_with(
            backend,
            store,
            SelectorConfig {
                over_fetch_factor: 3,
                recency_half_life_ms: 1_000,
            },
        );

        let bundle = selector.select("query", 2, 1.0, 10_000).await;
        let ids: Vec<&str> = bundle.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_blend_lifts_recent_runner_up() {
        let store = Arc::new(VectorStore::in_memory(DIMS));
        // "stale" wins on similarity, "fresh" on recency.
        store.upsert(record("stale", vec![1.0, 0.0, 0.0, 0.0], 0)).unwrap();
        store.upsert(record("fresh", vec![0.8, 0.6, 0.0, 0.0], 10_000)).unwrap();

        let backend = PinnedBackend::new(&[("query", vec![1.0, 0.0, 0.0, 0.0])]);
        let selector = selector_with(
            backend,
            store,
            SelectorConfig {
                over_fetch_factor: 3,
                recency_half_life_ms: 1_000,
            },
        );

        // stale: 1.0 * 0.5 + ~0.0 * 0.5 = 0.50
        // fresh: 0.8 * 0.5 + 1.0 * 0.5 = 0.90
        let bundle = selector.select("query", 2, 0.5, 10_000).await;
        assert_eq!(bundle.hits[0].id, "fresh");
        assert_eq!(bundle.hits[1].id, "stale");
    }

    #[tokio::test]
    async fn test_over_fetch_factor_drives_raw_candidates() {
        let store = Arc::new(VectorStore::in_memory(DIMS));
        for i in 0..100 {
            let angle = f32::from(i as u8) * 0.01;
            store
                .upsert(record(
                    &format!("r{i:03}"),
                    vec![angle.cos(), angle.sin(), 0.0, 0.0],
                    0,
                ))
                .unwrap();
        }

        let backend = PinnedBackend::new(&[("query", vec![1.0, 0.0, 0.0, 0.0])]);
        let selector = selector_with(backend, store, SelectorConfig::default());

        let bundle = selector.select("query", 5, 0.0, 0).await;
        assert_eq!(bundle.raw_candidates, 15);
        assert_eq!(bundle.len(), 5);
    }

    #[tokio::test]
    async fn test_selection_is_deterministic() {
        let store = Arc::new(VectorStore::in_memory(DIMS));
        for i in 0..10 {
            store
                .upsert(record(&format!("r{i}"), vec![1.0, 0.0, 0.0, 0.0], i * 100))
                .unwrap();
        }

        let backend = PinnedBackend::new(&[("query", vec![1.0, 0.0, 0.0, 0.0])]);
        let selector = selector_with(backend, store, SelectorConfig::default());

        let first = selector.select("query", 5, 0.3, 50_000).await;
        let second = selector.select("query", 5, 0.3, 50_000).await;

        let ids = |b: &ContextBundle| {
            b.hits.iter().map(|h| h.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.raw_candidates, second.raw_candidates);
    }

    #[tokio::test]
    async fn test_embedder_failure_degrades_to_empty() {
        let store = Arc::new(VectorStore::in_memory(DIMS));
        store.upsert(record("a", vec![1.0, 0.0, 0.0, 0.0], 0)).unwrap();

        let backend = PinnedBackend::new(&[]);
        backend.fail.store(true, Ordering::SeqCst);
        let selector = selector_with(backend, store, SelectorConfig::default());

        let bundle = selector.select("query", 5, 0.0, 0).await;
        assert!(bundle.is_empty());
    }
}
