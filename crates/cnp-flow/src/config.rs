//! Buffer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a buffer holds on to blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferMode {
    /// Blocks are handed to one reader; delivered blocks may be swept to make
    /// room, and close waits for unclaimed blocks to drain.
    #[default]
    BestEffort,
    /// Blocks stay until removed so every reader can fetch them; close does
    /// not wait.
    Persistent,
}

/// What a put does when the buffer is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Wait for space up to the put timeout.
    #[default]
    Block,
    /// Fail straight away with `CapacityExceeded`.
    Fail,
}

/// Configuration for a [`FlowControlledBuffer`](crate::FlowControlledBuffer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Maximum number of buffered blocks.
    pub capacity: usize,
    pub mode: BufferMode,
    pub overflow: OverflowPolicy,
    /// Upper bound on a blocked put.
    pub put_timeout: Duration,
    /// Upper bound on the drain wait in `close`.
    pub drain_timeout: Duration,
    /// Report an expired drain as an error instead of a warning.
    pub strict_drain: bool,
    /// Queue depth of each standing filter.
    pub filter_queue: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            mode: BufferMode::BestEffort,
            overflow: OverflowPolicy::Block,
            put_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(10),
            strict_drain: false,
            filter_queue: 64,
        }
    }
}

impl BufferConfig {
    pub fn builder() -> BufferConfigBuilder {
        BufferConfigBuilder::new()
    }
}

/// Builder for buffer configuration.
pub struct BufferConfigBuilder {
    config: BufferConfig,
}

impl BufferConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BufferConfig::default(),
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn mode(mut self, mode: BufferMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Shorthand for `mode(BufferMode::Persistent)`.
    pub fn persistent(self) -> Self {
        self.mode(BufferMode::Persistent)
    }

    pub fn overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.config.overflow = overflow;
        self
    }

    pub fn put_timeout(mut self, timeout: Duration) -> Self {
        self.config.put_timeout = timeout;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    pub fn strict_drain(mut self, strict: bool) -> Self {
        self.config.strict_drain = strict;
        self
    }

    pub fn filter_queue(mut self, depth: usize) -> Self {
        self.config.filter_queue = depth.max(1);
        self
    }

    pub fn build(self) -> BufferConfig {
        self.config
    }
}

impl Default for BufferConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
