use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for code chunking behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Structural segments longer than this (in lines) are cut into windows
    pub max_chunk_lines: usize,

    /// Window height (in lines) for the sliding-window fallback
    pub window_lines: usize,

    /// Overlap (in lines) between adjacent fallback windows
    pub overlap_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_lines: 400,
            window_lines: 120,
            overlap_lines: 20,
        }
    }
}

impl ChunkerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.window_lines == 0 {
            return Err(ChunkerError::invalid_config("window_lines must be > 0"));
        }
        if self.overlap_lines >= self.window_lines {
            return Err(ChunkerError::invalid_config(
                "overlap_lines must be smaller than window_lines",
            ));
        }
        if self.max_chunk_lines < self.window_lines {
            return Err(ChunkerError::invalid_config(
                "max_chunk_lines must be at least window_lines",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ChunkerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let config = ChunkerConfig {
            window_lines: 10,
            overlap_lines: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = ChunkerConfig {
            window_lines: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
