//! # cnp-core
//!
//! Data model for the Chalcedony content publisher: hierarchical names, the
//! segmentation naming profile, signed blocks, pull requests and the shared
//! error taxonomy.

pub mod block;
pub mod digest;
pub mod error;
pub mod interest;
pub mod name;
pub mod segment;

pub use block::{Block, ContentType, KeyLocator, PublisherId, Signature, SignedInfo, Witness};
pub use digest::{Digest, Hasher, DIGEST_LEN};
pub use error::{Error, Result};
pub use interest::Interest;
pub use name::{Component, Name};
pub use segment::{BASE_SEGMENT, DEFAULT_BLOCK_SIZE, DEFAULT_INCREMENT, DEFAULT_SCALE, SEGMENT_MARKER};
