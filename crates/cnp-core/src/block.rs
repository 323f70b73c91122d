//! Signed content blocks and the metadata bound to them.

use crate::digest::{Digest, Hasher};
use crate::name::Name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of content carried by a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Data,
    /// A piece of a larger segmented object.
    #[default]
    Fragment,
    Key,
    Link,
    Gone,
    Nack,
}

impl ContentType {
    fn type_byte(&self) -> u8 {
        match self {
            ContentType::Data => 0,
            ContentType::Fragment => 1,
            ContentType::Key => 2,
            ContentType::Link => 3,
            ContentType::Gone => 4,
            ContentType::Nack => 5,
        }
    }
}

/// Identity of a publisher: the digest of its public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublisherId(pub Digest);

impl PublisherId {
    pub fn from_public_key(public_key: &[u8]) -> Self {
        PublisherId(Hasher::hash(public_key))
    }

    pub fn digest(&self) -> &Digest {
        &self.0
    }
}

impl std::fmt::Debug for PublisherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublisherId({})", self.0.short())
    }
}

impl std::fmt::Display for PublisherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a verifier can find the key that signed a block.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyLocator {
    /// The raw public key bytes.
    Key(Vec<u8>),
    /// The name under which the key is published.
    KeyName(Name),
    /// The digest of the key.
    KeyDigest(PublisherId),
}

impl KeyLocator {
    fn encode_into(&self, hasher: &mut Hasher) {
        match self {
            KeyLocator::Key(bytes) => {
                hasher.update(&[0]);
                hasher.update_prefixed(bytes);
            }
            KeyLocator::KeyName(name) => {
                hasher.update(&[1]);
                name.encode_into(hasher);
            }
            KeyLocator::KeyDigest(id) => {
                hasher.update(&[2]);
                hasher.update(id.0.as_bytes());
            }
        }
    }
}

/// Metadata covered by a block's signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInfo {
    pub publisher: PublisherId,
    pub timestamp: DateTime<Utc>,
    pub content_type: ContentType,
    pub key_locator: KeyLocator,
    pub freshness_seconds: Option<u32>,
    /// Sequence number of the last segment of the object, once known.
    pub final_segment: Option<u64>,
}

impl SignedInfo {
    /// Create signed info stamped with the current time.
    pub fn new(publisher: PublisherId, content_type: ContentType, key_locator: KeyLocator) -> Self {
        SignedInfo {
            publisher,
            timestamp: Utc::now(),
            content_type,
            key_locator,
            freshness_seconds: None,
            final_segment: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_freshness(mut self, freshness_seconds: Option<u32>) -> Self {
        self.freshness_seconds = freshness_seconds;
        self
    }

    pub fn with_final_segment(mut self, final_segment: Option<u64>) -> Self {
        self.final_segment = final_segment;
        self
    }

    /// Feed an unambiguous encoding of every field into `hasher`.
    ///
    /// Timestamps are hashed at millisecond precision.
    pub fn encode_into(&self, hasher: &mut Hasher) {
        hasher.update(self.publisher.0.as_bytes());
        hasher.update(&self.timestamp.timestamp_millis().to_be_bytes());
        hasher.update(&[self.content_type.type_byte()]);
        self.key_locator.encode_into(hasher);
        match self.freshness_seconds {
            Some(secs) => {
                hasher.update(&[1]);
                hasher.update(&secs.to_be_bytes());
            }
            None => hasher.update(&[0]),
        }
        match self.final_segment {
            Some(seg) => {
                hasher.update(&[1]);
                hasher.update_u64(seg);
            }
            None => hasher.update(&[0]),
        }
    }
}

/// Inclusion proof for one leaf of a Merkle batch.
///
/// `path` holds sibling digests from the leaf upward. Levels where the node
/// was promoted without a sibling contribute nothing; the verifier rebuilds
/// the tree shape from `leaf_count`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub leaf_index: u64,
    pub leaf_count: u64,
    pub path: Vec<Digest>,
}

impl Witness {
    /// Witness of a batch of one block: the root is the leaf itself.
    pub fn single() -> Self {
        Witness {
            leaf_index: 0,
            leaf_count: 1,
            path: Vec::new(),
        }
    }
}

/// Signature over a batch root plus the block's path to that root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub root_signature: Vec<u8>,
    pub witness: Witness,
}

/// A named, signed unit of content. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    name: Name,
    sequence_number: u64,
    payload: Vec<u8>,
    signed_info: SignedInfo,
    signature: Signature,
}

impl Block {
    pub fn from_parts(
        name: Name,
        sequence_number: u64,
        payload: Vec<u8>,
        signed_info: SignedInfo,
        signature: Signature,
    ) -> Self {
        Block {
            name,
            sequence_number,
            payload,
            signed_info,
            signature,
        }
    }

    /// Take the block apart, e.g. to re-sign or re-encode it.
    pub fn into_parts(self) -> (Name, u64, Vec<u8>, SignedInfo, Signature) {
        (
            self.name,
            self.sequence_number,
            self.payload,
            self.signed_info,
            self.signature,
        )
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn signed_info(&self) -> &SignedInfo {
        &self.signed_info
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn content_type(&self) -> ContentType {
        self.signed_info.content_type
    }

    pub fn freshness_seconds(&self) -> Option<u32> {
        self.signed_info.freshness_seconds
    }

    pub fn publisher(&self) -> &PublisherId {
        &self.signed_info.publisher
    }

    /// True if this block is the announced last segment of its object.
    pub fn is_final_segment(&self) -> bool {
        self.signed_info.final_segment == Some(self.sequence_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> SignedInfo {
        let publisher = PublisherId::from_public_key(b"public key");
        SignedInfo::new(publisher, ContentType::Data, KeyLocator::KeyDigest(publisher))
    }

    fn digest_of(info: &SignedInfo) -> Digest {
        let mut hasher = Hasher::new();
        info.encode_into(&mut hasher);
        hasher.finalize()
    }

    #[test]
    fn test_signed_info_encoding_covers_fields() {
        let base = info();
        let d = digest_of(&base);
        assert_eq!(d, digest_of(&base.clone()));
        assert_ne!(d, digest_of(&base.clone().with_freshness(Some(10))));
        assert_ne!(d, digest_of(&base.clone().with_final_segment(Some(0))));

        let mut other_type = base.clone();
        other_type.content_type = ContentType::Fragment;
        assert_ne!(d, digest_of(&other_type));

        let mut other_locator = base;
        other_locator.key_locator = KeyLocator::KeyName(Name::parse("/keys/alice").unwrap());
        assert_ne!(d, digest_of(&other_locator));
    }

    #[test]
    fn test_block_accessors() {
        let name = Name::parse("/doc").unwrap().segment_name(3);
        let block = Block::from_parts(
            name.clone(),
            3,
            b"abc".to_vec(),
            info().with_final_segment(Some(3)).with_freshness(Some(60)),
            Signature {
                root_signature: vec![0; 64],
                witness: Witness::single(),
            },
        );
        assert_eq!(block.name(), &name);
        assert_eq!(block.payload(), b"abc");
        assert_eq!(block.content_type(), ContentType::Data);
        assert_eq!(block.freshness_seconds(), Some(60));
        assert!(block.is_final_segment());

        let (n, seq, payload, _, _) = block.into_parts();
        assert_eq!((n, seq, payload), (name, 3, b"abc".to_vec()));
    }

    #[test]
    fn test_block_serde_roundtrip() {
        let block = Block::from_parts(
            Name::parse("/doc").unwrap(),
            0,
            vec![1, 2, 3],
            info(),
            Signature {
                root_signature: vec![7; 64],
                witness: Witness::single(),
            },
        );
        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }
}
