//! # cnp-merkle
//!
//! Amortized signing for segmented content.
//!
//! This crate provides:
//! - Leaf digests binding each block's name, signed info and payload
//! - A binary hash tree with a fixed odd-node promotion rule
//! - The signing engine: one signature per batch, one path per block
//! - Verification of a single block with nothing but the publisher key
//!
//! ## Example
//!
//! ```rust
//! use cnp_core::{ContentType, KeyLocator, Name, PublisherId, SignedInfo};
//! use cnp_merkle::{verify_block, LeafInput, MerkleSigningEngine, SigningKey};
//!
//! let key = SigningKey::from_bytes(&[1u8; 32]);
//! let public = key.verifying_key();
//! let info = SignedInfo::new(
//!     PublisherId::from_public_key(public.as_bytes()),
//!     ContentType::Fragment,
//!     KeyLocator::Key(public.as_bytes().to_vec()),
//! );
//!
//! let root = Name::parse("/docs/report").unwrap();
//! let inputs = (0..3)
//!     .map(|i| LeafInput::new(root.segment_name(i), i, vec![i as u8; 16]))
//!     .collect();
//!
//! let batch = MerkleSigningEngine::new()
//!     .build_and_sign(inputs, &info, &key)
//!     .unwrap();
//!
//! // Each block verifies on its own.
//! for block in &batch.blocks {
//!     verify_block(block, &public).unwrap();
//! }
//! ```

mod engine;
mod tree;
mod verify;

pub use engine::{LeafInput, MerkleSigningEngine, RootSigner, SignedBatch};
pub use tree::{compute_root, leaf_digest, node_digest, MerkleTree};
pub use verify::{block_root, verify_block, verify_self_certified, VerifyError};

// Signing keys are part of the public API.
pub use ed25519_dalek::{SigningKey, VerifyingKey};
