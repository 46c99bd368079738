use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
///
/// Loaded from an optional TOML file, then overridden by `RELAY_*`
/// environment variables so deployments can tweak single knobs without
/// a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL of the AI backend
    pub backend_url: String,

    /// Request timeout for non-streaming backend calls, in seconds
    pub backend_timeout_secs: u64,

    /// Vector store op-log location
    pub store_path: PathBuf,

    /// Embedding vector dimensionality
    pub embedding_dims: usize,

    /// Maximum texts per embedding request
    pub embed_batch_size: usize,

    /// Capacity of the embedding cache
    pub embed_cache_capacity: usize,

    /// Raw neighbors fetched per requested context result
    pub over_fetch_factor: usize,

    /// Default similarity/recency blend weight, in [0, 1]
    pub recency_weight: f64,

    /// Recency half-life for context re-ranking
    pub recency_half_life_ms: u64,

    /// Failure fraction that opens a breaker
    pub breaker_failure_threshold: f64,

    /// Rolling outcome window per breaker
    pub breaker_window_size: usize,

    /// Minimum outcomes before the failure ratio is meaningful
    pub breaker_min_samples: usize,

    /// Cooldown before an open breaker admits probes
    pub breaker_cooldown_ms: u64,

    /// Consecutive probe successes that close a breaker
    pub breaker_half_open_probes: u32,

    /// Streaming session idle timeout
    pub stream_idle_timeout_ms: u64,

    /// Capacity of each session's event channel
    pub stream_channel_capacity: usize,

    /// Bind address of the prometheus exporter; disabled when unset
    pub metrics_bind: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080".to_string(),
            backend_timeout_secs: 60,
            store_path: PathBuf::from(".relay/store.jsonl"),
            embedding_dims: 768,
            embed_batch_size: 16,
            embed_cache_capacity: 2048,
            over_fetch_factor: 3,
            recency_weight: 0.25,
            recency_half_life_ms: 7 * 24 * 60 * 60 * 1000,
            breaker_failure_threshold: 0.5,
            breaker_window_size: 20,
            breaker_min_samples: 5,
            breaker_cooldown_ms: 30_000,
            breaker_half_open_probes: 3,
            stream_idle_timeout_ms: 30_000,
            stream_channel_capacity: 64,
            metrics_bind: None,
        }
    }
}

impl RelayConfig {
    /// Load the configuration: TOML file (when present) plus
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            Some(path) => {
                log::info!("config file {} not found, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("RELAY_BACKEND_URL") {
            self.backend_url = value;
        }
        if let Ok(value) = std::env::var("RELAY_STORE_PATH") {
            self.store_path = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("RELAY_EMBEDDING_DIMS") {
            parse_env("RELAY_EMBEDDING_DIMS", &value, &mut self.embedding_dims);
        }
        if let Ok(value) = std::env::var("RELAY_OVER_FETCH_FACTOR") {
            parse_env("RELAY_OVER_FETCH_FACTOR", &value, &mut self.over_fetch_factor);
        }
        if let Ok(value) = std::env::var("RELAY_RECENCY_WEIGHT") {
            parse_env("RELAY_RECENCY_WEIGHT", &value, &mut self.recency_weight);
        }
        if let Ok(value) = std::env::var("RELAY_STREAM_IDLE_TIMEOUT_MS") {
            parse_env(
                "RELAY_STREAM_IDLE_TIMEOUT_MS",
                &value,
                &mut self.stream_idle_timeout_ms,
            );
        }
        if let Ok(value) = std::env::var("RELAY_BREAKER_COOLDOWN_MS") {
            parse_env(
                "RELAY_BREAKER_COOLDOWN_MS",
                &value,
                &mut self.breaker_cooldown_ms,
            );
        }
        if let Ok(value) = std::env::var("RELAY_METRICS_BIND") {
            self.metrics_bind = if value.is_empty() { None } else { Some(value) };
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding_dims == 0 {
            bail!("embedding_dims must be > 0");
        }
        if !(0.0..=1.0).contains(&self.recency_weight) {
            bail!("recency_weight must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.breaker_failure_threshold) {
            bail!("breaker_failure_threshold must be within [0, 1]");
        }
        if self.over_fetch_factor == 0 {
            bail!("over_fetch_factor must be > 0");
        }
        Ok(())
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_idle_timeout_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_millis(self.breaker_cooldown_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str, target: &mut T) {
    match value.parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => log::warn!("ignoring unparseable {name}={value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_recency_weight_rejected() {
        let config = RelayConfig {
            recency_weight: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RelayConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: RelayConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.backend_url, config.backend_url);
        assert_eq!(parsed.embedding_dims, config.embedding_dims);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: RelayConfig =
            toml::from_str("embedding_dims = 384\nrecency_weight = 0.5\n").unwrap();
        assert_eq!(parsed.embedding_dims, 384);
        assert_eq!(parsed.recency_weight, 0.5);
        assert_eq!(parsed.over_fetch_factor, 3);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = RelayConfig::load(Some(Path::new("/no/such/relay.toml"))).unwrap();
        assert_eq!(config.embed_batch_size, RelayConfig::default().embed_batch_size);
    }
}
