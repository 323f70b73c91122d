//! Integration tests for batch signing.
//!
//! Tests cover:
//! - Every block of every batch size verifies on its own
//! - Tampering with one block's payload or name breaks exactly that block
//! - Batches of one use the same verification path as larger batches

use cnp_core::{Block, ContentType, KeyLocator, Name, PublisherId, SignedInfo};
use cnp_merkle::{
    block_root, verify_block, LeafInput, MerkleSigningEngine, SigningKey, VerifyingKey,
};
use proptest::prelude::*;

fn keypair() -> (SigningKey, VerifyingKey) {
    let key = SigningKey::generate(&mut rand::rngs::OsRng);
    let public = key.verifying_key();
    (key, public)
}

fn signed_info(public: &VerifyingKey) -> SignedInfo {
    SignedInfo::new(
        PublisherId::from_public_key(public.as_bytes()),
        ContentType::Fragment,
        KeyLocator::Key(public.as_bytes().to_vec()),
    )
}

fn sign(payloads: &[Vec<u8>]) -> (VerifyingKey, Vec<Block>) {
    let (key, public) = keypair();
    let root = Name::parse("/integration/object").unwrap();
    let inputs = payloads
        .iter()
        .enumerate()
        .map(|(i, p)| LeafInput::new(root.segment_name(i as u64), i as u64, p.clone()))
        .collect();
    let batch = MerkleSigningEngine::new()
        .build_and_sign(inputs, &signed_info(&public), &key)
        .unwrap();
    (public, batch.blocks)
}

fn with_payload(block: &Block, payload: Vec<u8>) -> Block {
    let (name, seq, _, info, sig) = block.clone().into_parts();
    Block::from_parts(name, seq, payload, info, sig)
}

fn with_name(block: &Block, name: Name) -> Block {
    let (_, seq, payload, info, sig) = block.clone().into_parts();
    Block::from_parts(name, seq, payload, info, sig)
}

#[test]
fn test_single_block_batch_verifies() {
    let (public, blocks) = sign(&[b"tiny".to_vec()]);
    assert_eq!(blocks.len(), 1);
    verify_block(&blocks[0], &public).unwrap();
}

#[test]
fn test_all_blocks_share_root() {
    let payloads: Vec<Vec<u8>> = (0..9u8).map(|i| vec![i; 32]).collect();
    let (_, blocks) = sign(&payloads);
    let root = block_root(&blocks[0]).unwrap();
    for block in &blocks {
        assert_eq!(block_root(block).unwrap(), root);
    }
}

#[test]
fn test_sibling_payloads_not_needed() {
    let payloads: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i; 100]).collect();
    let (public, blocks) = sign(&payloads);
    // Verify a lone block after every other block has been dropped.
    let lone = blocks[3].clone();
    drop(blocks);
    verify_block(&lone, &public).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_block_verifies(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..24)
    ) {
        let (public, blocks) = sign(&payloads);
        for block in &blocks {
            prop_assert!(verify_block(block, &public).is_ok());
        }
    }

    #[test]
    fn payload_tamper_is_isolated(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..16),
        target in any::<prop::sample::Index>(),
        byte in any::<prop::sample::Index>(),
    ) {
        let (public, blocks) = sign(&payloads);
        let t = target.index(blocks.len());
        let mut payload = blocks[t].payload().to_vec();
        let b = byte.index(payload.len());
        payload[b] ^= 0x01;
        let tampered = with_payload(&blocks[t], payload);

        prop_assert!(verify_block(&tampered, &public).is_err());
        for (i, block) in blocks.iter().enumerate() {
            if i != t {
                prop_assert!(verify_block(block, &public).is_ok());
            }
        }
    }

    #[test]
    fn name_tamper_is_isolated(
        count in 1usize..16,
        target in any::<prop::sample::Index>(),
    ) {
        let payloads: Vec<Vec<u8>> = (0..count).map(|i| vec![i as u8; 8]).collect();
        let (public, blocks) = sign(&payloads);
        let t = target.index(blocks.len());
        let renamed = with_name(&blocks[t], Name::parse("/elsewhere").unwrap().segment_name(t as u64));

        prop_assert!(verify_block(&renamed, &public).is_err());
        for (i, block) in blocks.iter().enumerate() {
            if i != t {
                prop_assert!(verify_block(block, &public).is_ok());
            }
        }
    }
}
