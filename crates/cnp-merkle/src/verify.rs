//! Independent verification of a single block.
//!
//! A verifier needs the block and the publisher's public key, nothing else:
//! the leaf digest is recomputed from the block's own name, signed info and
//! payload, walked up the witness to a root, and the root signature checked.

use crate::tree::{compute_root, leaf_digest};
use cnp_core::{Block, Digest, KeyLocator, PublisherId};
use ed25519_dalek::{Verifier, VerifyingKey};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Witness does not fit a tree of {leaf_count} leaves at index {leaf_index}")]
    MalformedWitness { leaf_index: u64, leaf_count: u64 },

    #[error("Malformed signature bytes")]
    MalformedSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Signature does not match recomputed root {0}")]
    BadSignature(String),

    #[error("Key locator does not carry a public key")]
    NoEmbeddedKey,

    #[error("Public key does not match publisher {0}")]
    PublisherMismatch(String),

    #[error("Name carries segment {name_segment} but block claims sequence {sequence_number}")]
    SequenceMismatch { name_segment: u64, sequence_number: u64 },
}

/// Recompute the batch root a block claims to belong to.
pub fn block_root(block: &Block) -> Result<Digest, VerifyError> {
    let witness = &block.signature().witness;
    let leaf = leaf_digest(block.name(), block.signed_info(), block.payload());
    compute_root(leaf, witness).ok_or(VerifyError::MalformedWitness {
        leaf_index: witness.leaf_index,
        leaf_count: witness.leaf_count,
    })
}

/// Verify a block against a known publisher key.
///
/// The sequence number is not covered by the signature, so a segmented name
/// must agree with it.
pub fn verify_block(block: &Block, public_key: &VerifyingKey) -> Result<(), VerifyError> {
    if let Some(name_segment) = block.name().segment_number() {
        if name_segment != block.sequence_number() {
            return Err(VerifyError::SequenceMismatch {
                name_segment,
                sequence_number: block.sequence_number(),
            });
        }
    }
    let root = block_root(block)?;
    let sig = ed25519_dalek::Signature::from_slice(&block.signature().root_signature)
        .map_err(|_| VerifyError::MalformedSignature)?;
    public_key
        .verify(root.as_bytes(), &sig)
        .map_err(|_| VerifyError::BadSignature(root.short()))
}

/// Verify a block whose key locator embeds the public key, checking that the
/// key also hashes to the claimed publisher id.
pub fn verify_self_certified(block: &Block) -> Result<(), VerifyError> {
    let KeyLocator::Key(bytes) = &block.signed_info().key_locator else {
        return Err(VerifyError::NoEmbeddedKey);
    };
    if PublisherId::from_public_key(bytes) != *block.publisher() {
        return Err(VerifyError::PublisherMismatch(block.publisher().digest().short()));
    }
    let key_bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| VerifyError::InvalidPublicKey)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| VerifyError::InvalidPublicKey)?;
    verify_block(block, &key)
}
