//! Amortized signing: one signature per batch, one inclusion path per block.

use crate::tree::{compute_root, leaf_digest, MerkleTree};
use cnp_core::{Block, Digest, Error, Name, Result, Signature, SignedInfo};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Something that can sign a batch root.
///
/// Implemented for Ed25519 signing keys; other implementations may front a
/// remote signer and fail with `KeyUnavailable`.
pub trait RootSigner {
    fn sign_root(&self, root: &Digest) -> Result<Vec<u8>>;

    /// Public half of the key, used for the post-signing self check.
    fn verifying_key(&self) -> Option<VerifyingKey> {
        None
    }
}

impl RootSigner for SigningKey {
    fn sign_root(&self, root: &Digest) -> Result<Vec<u8>> {
        Signer::<ed25519_dalek::Signature>::try_sign(self, root.as_bytes())
            .map(|sig| sig.to_bytes().to_vec())
            .map_err(|e| Error::SigningFailure(e.to_string()))
    }

    fn verifying_key(&self) -> Option<VerifyingKey> {
        Some(SigningKey::verifying_key(self))
    }
}

/// One block of a batch before signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafInput {
    pub name: Name,
    pub sequence_number: u64,
    pub payload: Vec<u8>,
}

impl LeafInput {
    pub fn new(name: Name, sequence_number: u64, payload: impl Into<Vec<u8>>) -> Self {
        LeafInput {
            name,
            sequence_number,
            payload: payload.into(),
        }
    }
}

/// Output of [`MerkleSigningEngine::build_and_sign`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBatch {
    pub root: Digest,
    pub root_signature: Vec<u8>,
    /// Signed blocks in input order.
    pub blocks: Vec<Block>,
}

/// Builds a hash tree over a batch, signs its root and stamps each block
/// with its inclusion path. Keeps no state between calls.
#[derive(Clone, Debug)]
pub struct MerkleSigningEngine {
    self_check: bool,
}

impl MerkleSigningEngine {
    pub fn new() -> Self {
        MerkleSigningEngine { self_check: true }
    }

    /// Skip re-deriving every block's root after signing.
    pub fn without_self_check() -> Self {
        MerkleSigningEngine { self_check: false }
    }

    /// Sign a batch. All blocks share `signed_info`.
    pub fn build_and_sign<S>(
        &self,
        inputs: Vec<LeafInput>,
        signed_info: &SignedInfo,
        signer: &S,
    ) -> Result<SignedBatch>
    where
        S: RootSigner + ?Sized,
    {
        if inputs.is_empty() {
            return Err(Error::invalid("signing batch must contain at least one block"));
        }

        let leaves: Vec<Digest> = inputs
            .iter()
            .map(|input| leaf_digest(&input.name, signed_info, &input.payload))
            .collect();
        let tree = MerkleTree::build(leaves)?;
        let root = tree.root();
        let root_signature = signer.sign_root(&root)?;

        debug!(
            leaves = tree.leaf_count(),
            depth = tree.depth(),
            root = %root.short(),
            "signed batch root"
        );

        let mut blocks = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.into_iter().enumerate() {
            let witness = tree
                .witness(index)
                .ok_or_else(|| Error::SigningFailure(format!("no path for leaf {}", index)))?;

            if self.self_check && compute_root(tree.leaves()[index], &witness) != Some(root) {
                return Err(Error::SigningFailure(format!(
                    "path for leaf {} does not reach root {}",
                    index,
                    root.short()
                )));
            }

            blocks.push(Block::from_parts(
                input.name,
                input.sequence_number,
                input.payload,
                signed_info.clone(),
                Signature {
                    root_signature: root_signature.clone(),
                    witness,
                },
            ));
        }

        if self.self_check {
            if let Some(key) = signer.verifying_key() {
                let sig = ed25519_dalek::Signature::from_slice(&root_signature)
                    .map_err(|e| Error::SigningFailure(e.to_string()))?;
                key.verify(root.as_bytes(), &sig)
                    .map_err(|e| Error::SigningFailure(e.to_string()))?;
            }
        }

        Ok(SignedBatch {
            root,
            root_signature,
            blocks,
        })
    }

    /// Sign a single block as a batch of one.
    pub fn sign_one<S>(&self, input: LeafInput, signed_info: &SignedInfo, signer: &S) -> Result<Block>
    where
        S: RootSigner + ?Sized,
    {
        let batch = self.build_and_sign(vec![input], signed_info, signer)?;
        batch
            .blocks
            .into_iter()
            .next()
            .ok_or_else(|| Error::SigningFailure("batch of one produced no block".into()))
    }
}

impl Default for MerkleSigningEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnp_core::{ContentType, KeyLocator, PublisherId, Witness};

    struct Unavailable;

    impl RootSigner for Unavailable {
        fn sign_root(&self, _root: &Digest) -> Result<Vec<u8>> {
            Err(Error::KeyUnavailable("hsm offline".into()))
        }
    }

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn info(key: &SigningKey) -> SignedInfo {
        let public = key.verifying_key().to_bytes().to_vec();
        SignedInfo::new(
            PublisherId::from_public_key(&public),
            ContentType::Fragment,
            KeyLocator::Key(public),
        )
    }

    fn inputs(n: u64) -> Vec<LeafInput> {
        let root = Name::parse("/batch").unwrap();
        (0..n)
            .map(|i| LeafInput::new(root.segment_name(i), i, vec![i as u8; 10]))
            .collect()
    }

    #[test]
    fn test_empty_batch_is_invalid() {
        let key = key();
        let result = MerkleSigningEngine::new().build_and_sign(Vec::new(), &info(&key), &key);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_key_unavailable_propagates() {
        let key = key();
        let result = MerkleSigningEngine::new().build_and_sign(inputs(2), &info(&key), &Unavailable);
        assert!(matches!(result, Err(Error::KeyUnavailable(_))));
    }

    #[test]
    fn test_batch_shares_one_signature() {
        let key = key();
        let batch = MerkleSigningEngine::new()
            .build_and_sign(inputs(5), &info(&key), &key)
            .unwrap();
        assert_eq!(batch.blocks.len(), 5);
        for (i, block) in batch.blocks.iter().enumerate() {
            assert_eq!(block.sequence_number(), i as u64);
            assert_eq!(block.signature().root_signature, batch.root_signature);
            assert_eq!(block.signature().witness.leaf_index, i as u64);
            assert_eq!(block.signature().witness.leaf_count, 5);
        }
    }

    #[test]
    fn test_sign_one_uses_single_leaf_witness() {
        let key = key();
        let input = inputs(1).remove(0);
        let block = MerkleSigningEngine::new()
            .sign_one(input, &info(&key), &key)
            .unwrap();
        assert_eq!(block.signature().witness, Witness::single());
    }
}
