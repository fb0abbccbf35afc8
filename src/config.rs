//! Analyzer configuration
//!
//! All knobs have working defaults; a TOML file can override any subset:
//!
//! ```toml
//! block_size = 131072
//! utc_offset_minutes = 0
//!
//! [perfect_hash]
//! max_attempts = 50000
//! ```

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Minutes that can be open at once: the current one and the one before it
pub const OPEN_MINUTES: usize = 2;

/// Budget for the perfect-hash mask search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfectHashConfig {
    /// Masks tried before giving up on a perfect hash
    pub max_attempts: u32,

    /// Largest dense table (mask + 1) the search may settle on
    pub max_table_len: usize,
}

impl Default for PerfectHashConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1_000_000,
            max_table_len: 1 << 22,
        }
    }
}

/// Configuration for one analysis run
///
/// # Example
/// ```
/// use rpcwatch::config::AnalyzerConfig;
///
/// let config = AnalyzerConfig::default();
/// assert_eq!(config.bucket_pool_size, 3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Bytes read from the source per block
    pub block_size: usize,

    /// Read buffers circulating between reader and parser
    ///
    /// Bounds memory: the reader blocks once all of them are queued.
    pub blocks_in_flight: usize,

    /// Recycled minute buckets
    ///
    /// Must exceed [`OPEN_MINUTES`], otherwise a minute could be reused while
    /// its samples are still being written.
    pub bucket_pool_size: usize,

    /// Minutes during which the IP-pair universe is expected to be discovered
    pub warmup_minutes: u32,

    /// Offset applied when rendering minute strings
    ///
    /// Default: 480 (UTC+08:00)
    pub utc_offset_minutes: i32,

    /// Materialize longest paths for every edge, not just rule-referenced ones
    pub materialize_all_edges: bool,

    pub perfect_hash: PerfectHashConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            block_size: 256 << 10,
            blocks_in_flight: 2,
            bucket_pool_size: 3,
            warmup_minutes: 2,
            utc_offset_minutes: 480,
            materialize_all_edges: false,
            perfect_hash: PerfectHashConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Smaller blocks and a single buffer in flight
    pub fn low_memory() -> Self {
        Self {
            block_size: 32 << 10,
            blocks_in_flight: 1,
            ..Self::default()
        }
    }

    /// Load from a TOML file; absent keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| AnalysisError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(AnalysisError::Config("block_size must be > 0".into()));
        }
        if self.blocks_in_flight == 0 {
            return Err(AnalysisError::Config(
                "blocks_in_flight must be >= 1".into(),
            ));
        }
        if self.bucket_pool_size <= OPEN_MINUTES {
            return Err(AnalysisError::Config(format!(
                "bucket_pool_size must exceed the {} open minutes, got {}",
                OPEN_MINUTES, self.bucket_pool_size
            )));
        }
        if !(-24 * 60 < self.utc_offset_minutes && self.utc_offset_minutes < 24 * 60) {
            return Err(AnalysisError::Config(format!(
                "utc_offset_minutes must be within ±1439, got {}",
                self.utc_offset_minutes
            )));
        }
        if self.perfect_hash.max_table_len == 0 {
            return Err(AnalysisError::Config(
                "perfect_hash.max_table_len must be > 0".into(),
            ));
        }
        Ok(())
    }
}
