// In: src/config.rs

//! The single source of truth for all zipq session configuration.
//!
//! This module defines the unified `ZipqConfig` struct, which is created once at
//! the application boundary (from CLI flags, optionally layered over a JSON file)
//! and then handed to an `OffloadSession`, which keeps its own copy for the
//! lifetime of the session.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ZipqError;
use crate::format::{ALG_TAG_GZIP, ALG_TAG_ZLIB, HW_BLOCK_LIMIT, SLOT_MIN_HEADROOM};

//==================================================================================
// I. Core Configuration Enums
//==================================================================================

/// Selects the container framing, and with it the engine's compression variant.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Single-block streams behind the 2-byte zlib short header.
    Zlib,
    /// **Default:** Multi-member gzip, each member carrying its block length in an
    /// extra field so a reader can find the next member without inflating.
    #[default]
    Gzip,
}

impl Algorithm {
    /// The engine's algorithm selector written into every descriptor.
    pub fn tag(self) -> u32 {
        match self {
            Algorithm::Zlib => ALG_TAG_ZLIB,
            Algorithm::Gzip => ALG_TAG_GZIP,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Zlib => "zlib",
            Algorithm::Gzip => "gzip",
        }
    }
}

/// The operation the engine performs on each block.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Deflate,
    Inflate,
}

/// Parameters for the bounded exponential backoff used while the transport
/// reports a transient condition.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// First sleep after a transient result, in microseconds.
    #[serde(default = "default_backoff_initial_us")]
    pub initial_us: u64,
    /// Ceiling for a single sleep, in microseconds.
    #[serde(default = "default_backoff_max_us")]
    pub max_us: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_us: default_backoff_initial_us(),
            max_us: default_backoff_max_us(),
        }
    }
}

//==================================================================================
// II. The Unified ZipqConfig
//==================================================================================

/// The single, unified configuration for one offload session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ZipqConfig {
    /// Container framing and engine variant.
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Compress or decompress.
    #[serde(default)]
    pub direction: Direction,

    /// Number of parallel compute queues. Submissions are spread round-robin.
    #[serde(default = "default_queue_count")]
    pub queue_count: usize,

    /// **The nominal number of source bytes per engine request.**
    /// Every slot buffer is sized at twice this value.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Number of slots in the pool, i.e. the pipeline depth.
    #[serde(default = "default_cache_depth")]
    pub cache_depth: usize,

    /// Upper bound for a single completion wait, in milliseconds.
    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for ZipqConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            direction: Direction::default(),
            queue_count: default_queue_count(),
            block_size: default_block_size(),
            cache_depth: default_cache_depth(),
            completion_timeout_ms: default_completion_timeout_ms(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ZipqConfig {
    /// Loads a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ZipqError> {
        let text = std::fs::read_to_string(path)?;
        let config: ZipqConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Capacity of every slot buffer: twice the block size, and never less than
    /// `block_size + SLOT_MIN_HEADROOM` so tiny blocks still fit their engine output.
    pub fn slot_capacity(&self) -> usize {
        self.block_size
            .saturating_mul(2)
            .max(self.block_size.saturating_add(SLOT_MIN_HEADROOM))
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    /// Rejects configurations no session can run with.
    pub fn validate(&self) -> Result<(), ZipqError> {
        if self.queue_count == 0 {
            return Err(ZipqError::InvalidConfig("queue_count must be > 0".into()));
        }
        if self.block_size == 0 {
            return Err(ZipqError::InvalidConfig("block_size must be > 0".into()));
        }
        if self.cache_depth == 0 {
            return Err(ZipqError::InvalidConfig("cache_depth must be > 0".into()));
        }
        // The descriptor carries 32-bit lengths.
        if self.slot_capacity() > u32::MAX as usize {
            return Err(ZipqError::InvalidConfig(format!(
                "block_size {} is too large for a 32-bit descriptor",
                self.block_size
            )));
        }
        if self.backoff.max_us < self.backoff.initial_us {
            return Err(ZipqError::InvalidConfig(
                "backoff.max_us must be >= backoff.initial_us".into(),
            ));
        }
        // The zlib engine handles a stream in one invocation.
        if self.algorithm == Algorithm::Zlib && self.block_size > HW_BLOCK_LIMIT {
            return Err(ZipqError::BlockSizeAboveLimit {
                block_size: self.block_size,
                limit: HW_BLOCK_LIMIT,
            });
        }
        Ok(())
    }
}

fn default_queue_count() -> usize {
    1
}

fn default_block_size() -> usize {
    512_000
}

fn default_cache_depth() -> usize {
    4
}

fn default_completion_timeout_ms() -> u64 {
    1000
}

fn default_backoff_initial_us() -> u64 {
    1
}

fn default_backoff_max_us() -> u64 {
    1000
}
