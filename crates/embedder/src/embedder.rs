use crate::error::{EmbedError, Result};
use lru::LruCache;
use ndarray::ArrayView1;
use relay_backend::AiBackend;
use relay_resilience::{BreakerError, CircuitBreaker};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Configuration for the embedder
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Expected vector dimensionality
    pub dims: usize,

    /// Maximum texts per backend request
    pub max_batch_size: usize,

    /// Capacity of the digest-keyed vector cache
    pub cache_capacity: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            dims: 768,
            max_batch_size: 16,
            cache_capacity: 2048,
        }
    }
}

/// Observer for embed call telemetry.
///
/// Called after each backend round trip; implementations must be cheap.
pub trait EmbedderObserver: Send + Sync {
    fn on_embed_call(&self, batch_size: usize, success: bool, latency_ms: f64);
}

type VectorCache = Mutex<LruCache<[u8; 32], Vec<f32>>>;

/// Breaker-guarded, batching, normalizing embedding client
pub struct Embedder {
    backend: Arc<dyn AiBackend>,
    breaker: Arc<CircuitBreaker>,
    config: EmbedderConfig,
    cache: VectorCache,
    observer: Option<Arc<dyn EmbedderObserver>>,
}

impl Embedder {
    #[must_use]
    pub fn new(
        backend: Arc<dyn AiBackend>,
        breaker: Arc<CircuitBreaker>,
        config: EmbedderConfig,
    ) -> Self {
        let capacity =
            NonZeroUsize::new(config.cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            backend,
            breaker,
            config,
            cache: Mutex::new(LruCache::new(capacity)),
            observer: None,
        }
    }

    /// Attach a telemetry observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn EmbedderObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Configured vector dimensionality
    #[must_use]
    pub const fn dims(&self) -> usize {
        self.config.dims
    }

    /// Embed one text into a normalized vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = digest(text);
        if let Some(vector) = self.cache_get(&key) {
            return Ok(vector);
        }

        let mut results = self.call_backend(&[text.to_string()]).await?;
        results
            .pop()
            .unwrap_or_else(|| Err(EmbedError::Backend("empty response".to_string())))
    }

    /// Embed many texts, order preserved, one result per input.
    ///
    /// Inputs are grouped into backend requests of at most
    /// `max_batch_size`. A transiently failing batch is retried one item
    /// at a time, so errors surface per item.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vec<f32>>> {
        let mut results: Vec<Option<Result<Vec<f32>>>> = vec![None; texts.len()];

        let mut pending = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            if let Some(vector) = self.cache_get(&digest(text)) {
                results[i] = Some(Ok(vector));
            } else {
                pending.push(i);
            }
        }

        for batch in pending.chunks(self.config.max_batch_size.max(1)) {
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
            match self.call_backend(&batch_texts).await {
                Ok(per_item) => {
                    for (&i, result) in batch.iter().zip(per_item) {
                        results[i] = Some(result);
                    }
                }
                // The circuit is open: nothing to gain from singleton
                // retries, every one would be rejected too.
                Err(e @ EmbedError::Unavailable { .. }) => {
                    for &i in batch {
                        results[i] = Some(Err(e.clone()));
                    }
                }
                Err(e) if batch.len() == 1 => {
                    results[batch[0]] = Some(Err(e));
                }
                Err(e) => {
                    log::warn!(
                        "batch of {} failed ({e}), degrading to singleton retries",
                        batch.len()
                    );
                    for &i in batch {
                        results[i] = Some(match self.call_backend(&[texts[i].clone()]).await {
                            Ok(mut one) => one
                                .pop()
                                .unwrap_or_else(|| Err(EmbedError::Backend("empty response".to_string()))),
                            Err(item_err) => Err(item_err),
                        });
                    }
                }
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(EmbedError::Backend("not attempted".to_string()))))
            .collect()
    }

    /// One guarded backend round trip; per-item validation of the
    /// returned vectors.
    async fn call_backend(&self, texts: &[String]) -> Result<Vec<Result<Vec<f32>>>> {
        if let Err(BreakerError::Open { retry_after_ms, .. }) = self.breaker.try_acquire() {
            return Err(EmbedError::Unavailable { retry_after_ms });
        }

        let started = Instant::now();
        let outcome = self.backend.embed(texts).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1e3;

        let vectors = match outcome {
            Ok(vectors) if vectors.len() == texts.len() => {
                self.breaker.record_success();
                self.observe(texts.len(), true, latency_ms);
                vectors
            }
            Ok(vectors) => {
                self.breaker.record_failure();
                self.observe(texts.len(), false, latency_ms);
                return Err(EmbedError::Backend(format!(
                    "expected {} vectors, got {}",
                    texts.len(),
                    vectors.len()
                )));
            }
            Err(e) => {
                self.breaker.record_failure();
                self.observe(texts.len(), false, latency_ms);
                return Err(EmbedError::Backend(e.to_string()));
            }
        };

        Ok(texts
            .iter()
            .zip(vectors)
            .map(|(text, mut vector)| {
                if vector.len() != self.config.dims {
                    return Err(EmbedError::DimensionMismatch {
                        expected: self.config.dims,
                        actual: vector.len(),
                    });
                }
                normalize(&mut vector);
                self.cache_put(digest(text), vector.clone());
                Ok(vector)
            })
            .collect())
    }

    fn cache_get(&self, key: &[u8; 32]) -> Option<Vec<f32>> {
        match self.cache.lock() {
            Ok(mut guard) => guard.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn cache_put(&self, key: [u8; 32], vector: Vec<f32>) {
        match self.cache.lock() {
            Ok(mut guard) => {
                guard.put(key, vector);
            }
            Err(poisoned) => {
                poisoned.into_inner().put(key, vector);
            }
        }
    }

    fn observe(&self, batch_size: usize, success: bool, latency_ms: f64) {
        if let Some(observer) = &self.observer {
            observer.on_embed_call(batch_size, success, latency_ms);
        }
    }
}

fn digest(text: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}

/// L2-normalize in place; the zero vector is left untouched.
fn normalize(vector: &mut [f32]) {
    let view = ArrayView1::from(&*vector);
    let norm = view.dot(&view).sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use relay_backend::{BackendError, BackendEvent, CompletionRequest};
    use relay_resilience::{BreakerConfig, BreakerRegistry};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Deterministic fake backend: each vector is a hash-derived unit
    /// basis direction, so identical text embeds identically.
    struct FakeBackend {
        dims: usize,
        calls: AtomicUsize,
        poison: HashSet<String>,
        wrong_dims: HashSet<String>,
    }

    impl FakeBackend {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                calls: AtomicUsize::new(0),
                poison: HashSet::new(),
                wrong_dims: HashSet::new(),
            }
        }

        fn vector_for(&self, text: &str, dims: usize) -> Vec<f32> {
            let mut vector = vec![0.0; dims];
            let index = text.bytes().map(usize::from).sum::<usize>() % dims;
            vector[index] = 2.0;
            vector[(index + 1) % dims] = 1.0;
            vector
        }
    }

    #[async_trait::async_trait]
    impl AiBackend for FakeBackend {
        async fn embed(
            &self,
            texts: &[String],
        ) -> relay_backend::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| self.poison.contains(t)) {
                return Err(BackendError::transient("poisoned input"));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let dims = if self.wrong_dims.contains(t) {
                        self.dims + 1
                    } else {
                        self.dims
                    };
                    self.vector_for(t, dims)
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

    fn embedder_with(backend: FakeBackend, max_batch_size: usize) -> (Embedder, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let embedder = Embedder::new(
            backend.clone(),
            registry.handle("embeddings"),
            EmbedderConfig {
                dims: 8,
                max_batch_size,
                cache_capacity: 64,
            },
        );
        (embedder, backend)
    }

    #[tokio::test]
    async fn test_embed_normalizes_at_creation() {
        let (embedder, _) = embedder_with(FakeBackend::new(8), 16);
        let vector = embedder.embed("fn main() {}").await.unwrap();

        assert_eq!(vector.len(), 8);
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let (embedder, _) = embedder_with(FakeBackend::new(8), 16);
        let texts: Vec<String> = ["alpha", "beta", "gamma"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let batch = embedder.embed_batch(&texts).await;
        for (text, result) in texts.iter().zip(&batch) {
            let single = embedder.embed(text).await.unwrap();
            assert_eq!(result.as_ref().unwrap(), &single);
        }
    }

    #[tokio::test]
    async fn test_cache_serves_repeats_without_backend() {
        let (embedder, backend) = embedder_with(FakeBackend::new(8), 16);

        let first = embedder.embed("same text").await.unwrap();
        let second = embedder.embed("same text").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poisoned_item_fails_alone() {
        let mut fake = FakeBackend::new(8);
        fake.poison.insert("poison".to_string());
        let (embedder, backend) = embedder_with(fake, 16);

        let texts: Vec<String> = ["good", "poison", "also good"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let batch = embedder.embed_batch(&texts).await;

        assert!(batch[0].is_ok());
        assert!(matches!(batch[1], Err(EmbedError::Backend(_))));
        assert!(batch[2].is_ok());
        // One batch attempt plus three singleton retries.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_batches_split_at_max_size() {
        let (embedder, backend) = embedder_with(FakeBackend::new(8), 2);
        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();

        let batch = embedder.embed_batch(&texts).await;
        assert!(batch.iter().all(Result::is_ok));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal_per_item() {
        let mut fake = FakeBackend::new(8);
        fake.wrong_dims.insert("odd one".to_string());
        let (embedder, _) = embedder_with(fake, 16);

        let texts: Vec<String> = ["fine", "odd one"].iter().map(|s| s.to_string()).collect();
        let batch = embedder.embed_batch(&texts).await;

        assert!(batch[0].is_ok());
        assert_eq!(
            batch[1],
            Err(EmbedError::DimensionMismatch {
                expected: 8,
                actual: 9
            })
        );
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_without_backend_call() {
        let backend = Arc::new(FakeBackend::new(8));
        let registry = BreakerRegistry::new(BreakerConfig {
            min_samples: 1,
            failure_threshold: 0.5,
            ..Default::default()
        });
        let breaker = registry.handle("embeddings");
        breaker.record_failure();

        let embedder = Embedder::new(
            backend.clone(),
            breaker,
            EmbedderConfig {
                dims: 8,
                max_batch_size: 16,
                cache_capacity: 64,
            },
        );

        let result = embedder.embed("anything").await;
        assert!(matches!(result, Err(EmbedError::Unavailable { .. })));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        // Batch path short-circuits too, without singleton retries.
        let batch = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await;
        assert!(batch
            .iter()
            .all(|r| matches!(r, Err(EmbedError::Unavailable { .. }))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
