//! Segmenter configuration.

use crate::numbering::SegmentNumbering;
use cnp_core::{Error, Result, DEFAULT_BLOCK_SIZE};
use serde::{Deserialize, Serialize};

/// Environment variable holding the block size in bytes.
pub const BLOCK_SIZE_VAR: &str = "CNP_BLOCK_SIZE";
/// Environment variable holding the numbering mode, e.g. `byte-count`.
pub const NUMBERING_VAR: &str = "CNP_NUMBERING";

/// Per-stream segmenting parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Maximum payload bytes per block.
    pub block_size: usize,
    pub numbering: SegmentNumbering,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            numbering: SegmentNumbering::default(),
        }
    }
}

impl SegmenterConfig {
    pub fn new(block_size: usize, numbering: SegmentNumbering) -> Result<Self> {
        let config = Self {
            block_size,
            numbering,
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `CNP_BLOCK_SIZE` and `CNP_NUMBERING`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(BLOCK_SIZE_VAR) {
            config.block_size = raw
                .trim()
                .parse()
                .map_err(|e| Error::invalid(format!("{}={:?}: {}", BLOCK_SIZE_VAR, raw, e)))?;
        }
        if let Some(raw) = lookup(NUMBERING_VAR) {
            config.numbering = raw.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::invalid("block size must be positive"));
        }
        self.numbering.validate()
    }
}
