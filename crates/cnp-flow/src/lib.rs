//! # cnp-flow
//!
//! Flow control between a content producer and its readers.
//!
//! This crate provides:
//! - `NameMatcher`: prefix-match table from name patterns to listeners
//! - `FlowControlledBuffer`: bounded, name-keyed block buffer with blocking
//!   puts, parked pull requests, standing filters and a drain-on-close protocol
//! - `BufferConfig`: capacity, buffer mode, overflow policy and timeouts

mod buffer;
mod config;
mod matcher;

pub use buffer::{BufferPhase, DrainReport, FlowControlledBuffer, Subscription};
pub use config::{BufferConfig, BufferConfigBuilder, BufferMode, OverflowPolicy};
pub use matcher::NameMatcher;
