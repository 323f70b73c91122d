//! Publisher keys.

use cnp_core::{Error, KeyLocator, PublisherId, Result};
use cnp_merkle::{SigningKey, VerifyingKey};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use std::collections::HashMap;

/// Resolves publisher identities to signing keys.
pub trait KeyManager: Send + Sync {
    /// Publisher used when a put names none.
    fn default_publisher(&self) -> PublisherId;

    /// Private key for `publisher`, or `KeyUnavailable`.
    fn signing_key(&self, publisher: &PublisherId) -> Result<SigningKey>;

    /// Locator telling verifiers where to find the public half of `key`.
    /// Defaults to embedding the public key itself.
    fn key_locator(&self, key: &SigningKey) -> KeyLocator {
        KeyLocator::Key(key.verifying_key().to_bytes().to_vec())
    }

    fn verifying_key(&self, publisher: &PublisherId) -> Result<VerifyingKey> {
        self.signing_key(publisher).map(|key| key.verifying_key())
    }
}

/// Publisher id of an Ed25519 key: the digest of its public key.
pub fn publisher_id(key: &VerifyingKey) -> PublisherId {
    PublisherId::from_public_key(key.as_bytes())
}

/// In-memory key store.
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<PublisherId, SigningKey>>,
    default: RwLock<PublisherId>,
}

impl MemoryKeyStore {
    /// Store holding one freshly generated default key.
    pub fn generate() -> Self {
        Self::with_default(SigningKey::generate(&mut OsRng))
    }

    /// Store whose default key is derived from a fixed seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::with_default(SigningKey::from_bytes(&seed))
    }

    pub fn with_default(key: SigningKey) -> Self {
        let id = publisher_id(&key.verifying_key());
        let mut keys = HashMap::new();
        keys.insert(id, key);
        MemoryKeyStore {
            keys: RwLock::new(keys),
            default: RwLock::new(id),
        }
    }

    /// Add a key and return its publisher id.
    pub fn insert(&self, key: SigningKey) -> PublisherId {
        let id = publisher_id(&key.verifying_key());
        self.keys.write().insert(id, key);
        id
    }

    pub fn set_default(&self, publisher: PublisherId) -> Result<()> {
        if !self.keys.read().contains_key(&publisher) {
            return Err(Error::KeyUnavailable(publisher.to_string()));
        }
        *self.default.write() = publisher;
        Ok(())
    }

    /// Forget a key. The default publisher cannot be removed.
    pub fn remove(&self, publisher: &PublisherId) -> Option<SigningKey> {
        if *self.default.read() == *publisher {
            return None;
        }
        self.keys.write().remove(publisher)
    }

    pub fn publishers(&self) -> Vec<PublisherId> {
        let mut ids: Vec<_> = self.keys.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl KeyManager for MemoryKeyStore {
    fn default_publisher(&self) -> PublisherId {
        *self.default.read()
    }

    fn signing_key(&self, publisher: &PublisherId) -> Result<SigningKey> {
        self.keys
            .read()
            .get(publisher)
            .cloned()
            .ok_or_else(|| Error::KeyUnavailable(publisher.to_string()))
    }
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyStore")
            .field("default", &*self.default.read())
            .field("keys", &self.len())
            .finish()
    }
}
