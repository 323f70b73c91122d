//! # cnp-sdk
//!
//! Publishing API for the Chalcedony content publisher.
//!
//! ```rust
//! use cnp_sdk::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let buffer = FlowControlledBuffer::new(BufferConfig::builder().persistent().build());
//! let keys = Arc::new(MemoryKeyStore::generate());
//! let mut segmenter = Segmenter::block_segmenter(buffer.clone(), keys, 1024, 1).unwrap();
//!
//! let name = Name::parse("/videos/intro").unwrap();
//! let content = vec![7u8; 5000];
//! let first = segmenter.finish(&name, &content, PutOptions::new()).await.unwrap();
//! assert_eq!(first.sequence_number(), 0);
//!
//! // Readers pull segments by name and verify each one on its own.
//! let block = buffer
//!     .handle_request(name.clone(), Duration::from_millis(10))
//!     .await
//!     .unwrap()
//!     .unwrap();
//! verify_self_certified(&block).unwrap();
//! # });
//! ```
//!
//! # Modules
//!
//! - [`segmenter`] - Splitting content into signed, numbered blocks
//! - [`numbering`] - Segment numbering policies
//! - [`keys`] - Publisher key resolution
//! - [`transport`] - Interest delivery and the interest server
//! - [`config`] - Segmenter configuration

pub mod config;
pub mod keys;
pub mod numbering;
pub mod segmenter;
pub mod transport;

pub use config::SegmenterConfig;
pub use keys::{publisher_id, KeyManager, MemoryKeyStore};
pub use numbering::SegmentNumbering;
pub use segmenter::{PutOptions, Segmenter};
pub use transport::{
    FaceId, InterestServer, MemoryFace, MemoryTransport, ServerHandle, ServerStats, Transport,
    TransportError,
};

// Re-export the lower layers so applications need one dependency.
pub use cnp_core::{
    Block, ContentType, Error, Interest, KeyLocator, Name, PublisherId, Result, SignedInfo,
};
pub use cnp_flow::{
    BufferConfig, BufferConfigBuilder, BufferMode, BufferPhase, DrainReport, FlowControlledBuffer,
    OverflowPolicy,
};
pub use cnp_merkle::{verify_block, verify_self_certified, SigningKey, VerifyError, VerifyingKey};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::keys::{KeyManager, MemoryKeyStore};
    pub use crate::numbering::SegmentNumbering;
    pub use crate::segmenter::{PutOptions, Segmenter};
    pub use crate::transport::{FaceId, InterestServer, MemoryTransport, Transport};
    pub use cnp_core::{Block, Error, Interest, Name};
    pub use cnp_flow::{BufferConfig, FlowControlledBuffer, OverflowPolicy};
    pub use cnp_merkle::{verify_block, verify_self_certified};
}
