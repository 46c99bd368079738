use crate::breaker::{BreakerConfig, BreakerObserver, BreakerStatus, CircuitBreaker};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Registry of named circuit breakers, one per backend dependency.
///
/// Injected into callers rather than accessed via ambient globals, so
/// each dependency can be faked independently in tests. Breakers are
/// created lazily with the registry's shared configuration and observer
/// list.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<BTreeMap<String, Arc<CircuitBreaker>>>,
    observers: Arc<Mutex<Vec<Arc<dyn BreakerObserver>>>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(BTreeMap::new()),
            observers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Attach an observer; it sees transitions of every breaker in the
    /// registry, including ones created before the call.
    pub fn add_observer(&self, observer: Arc<dyn BreakerObserver>) {
        match self.observers.lock() {
            Ok(mut guard) => guard.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }

    /// Get or create the breaker for a backend dependency key.
    #[must_use]
    pub fn handle(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut breakers = match self.breakers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_observers(
                    key,
                    self.config.clone(),
                    Arc::clone(&self.observers),
                ))
            })
            .clone()
    }

    /// Status snapshots of every registered breaker, sorted by name.
    #[must_use]
    pub fn snapshots(&self) -> Vec<BreakerStatus> {
        let breakers = match self.breakers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        breakers.values().map(|b| b.status()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerState;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_handle_returns_same_breaker() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let a = registry.handle("embeddings");
        let b = registry.handle("embeddings");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_keys_are_independent() {
        let config = BreakerConfig {
            min_samples: 1,
            failure_threshold: 0.5,
            ..Default::default()
        };
        let registry = BreakerRegistry::new(config);

        let embeddings = registry.handle("embeddings");
        let completion = registry.handle("completion");

        embeddings.record_failure();
        assert_eq!(embeddings.state(), BreakerState::Open);
        assert_eq!(completion.state(), BreakerState::Closed);
        assert!(completion.try_acquire().is_ok());
    }

    #[test]
    fn test_snapshots_sorted_by_name() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        registry.handle("completion");
        registry.handle("embeddings");

        let names: Vec<String> = registry
            .snapshots()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["completion", "embeddings"]);
    }
}
