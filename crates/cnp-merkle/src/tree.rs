//! Binary hash tree over the leaf digests of one signing batch.
//!
//! Leaves and interior nodes are domain-separated (`0x00` / `0x01` prefix).
//! Levels are built bottom-up in block order; when a level has an odd number
//! of nodes the last one is promoted unchanged, never duplicated. The shape
//! is therefore a pure function of the leaf count, which is all a verifier
//! needs besides the sibling path.

use cnp_core::{Digest, Error, Hasher, Name, Result, SignedInfo, Witness};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Digest binding a block's full name, its signed info and its payload.
pub fn leaf_digest(name: &Name, signed_info: &SignedInfo, payload: &[u8]) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    name.encode_into(&mut hasher);
    signed_info.encode_into(&mut hasher);
    hasher.update_prefixed(payload);
    hasher.finalize()
}

pub fn node_digest(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hasher.finalize()
}

/// A fully built tree. Lives only for the duration of one batch.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// `levels[0]` are the leaves, the last level holds only the root.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    pub fn build(leaves: Vec<Digest>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::invalid("cannot build a Merkle tree with no leaves"));
        }

        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let next: Vec<Digest> = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => node_digest(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }

        Ok(MerkleTree { levels })
    }

    pub fn root(&self) -> Digest {
        // build() guarantees a non-empty top level
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn leaves(&self) -> &[Digest] {
        &self.levels[0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Sibling path from leaf `index` to the root.
    pub fn witness(&self, index: usize) -> Option<Witness> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut i = index;
        for level in &self.levels[..self.levels.len() - 1] {
            if i % 2 == 1 {
                path.push(level[i - 1]);
            } else if i + 1 < level.len() {
                path.push(level[i + 1]);
            }
            i /= 2;
        }

        Some(Witness {
            leaf_index: index as u64,
            leaf_count: self.leaf_count() as u64,
            path,
        })
    }
}

/// Recompute a batch root from one leaf and its witness.
///
/// Returns `None` if the witness does not fit the tree shape implied by its
/// leaf count (wrong number of siblings, index out of range).
pub fn compute_root(leaf: Digest, witness: &Witness) -> Option<Digest> {
    if witness.leaf_count == 0 || witness.leaf_index >= witness.leaf_count {
        return None;
    }

    let mut siblings = witness.path.iter();
    let mut current = leaf;
    let mut index = witness.leaf_index;
    let mut width = witness.leaf_count;

    while width > 1 {
        if index % 2 == 1 {
            current = node_digest(siblings.next()?, &current);
        } else if index + 1 < width {
            current = node_digest(&current, siblings.next()?);
        }
        index /= 2;
        width = width.div_ceil(2);
    }

    if siblings.next().is_some() {
        return None;
    }
    Some(current)
}
