//! Symmetric keys and node key resolution

use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use zeroize::Zeroize;

use crate::error::KeyError;
use crate::KEY_SIZE;

/// A 256-bit AES-GCM key. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from a slice that must be exactly [`KEY_SIZE`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| KeyError::InvalidLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit key from the OS random source.
pub fn generate_key() -> Result<SymmetricKey, rand::Error> {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(SymmetricKey::from_bytes(bytes))
}

/// Maps a node identifier to the key its passphrase is sealed under.
///
/// Any error is treated as "no key" by [`crate::Sealer`], which then falls
/// back to a random key. Implementations need not distinguish causes.
///
/// Resolution may wait on a remote backend. A caller that stops polling the
/// [`crate::Sealer`] future (timeout, dropped RPC) abandons the lookup; no
/// cipher work starts until `resolve` has returned.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, node_uuid: &str) -> Result<SymmetricKey, KeyError>;
}

/// Plain functions and closures resolve without waiting.
#[async_trait]
impl<F> KeyResolver for F
where
    F: Fn(&str) -> Result<SymmetricKey, KeyError> + Send + Sync,
{
    async fn resolve(&self, node_uuid: &str) -> Result<SymmetricKey, KeyError> {
        self(node_uuid)
    }
}

/// In-memory resolver: per-node keys plus an optional key shared by all other nodes.
#[derive(Debug, Default)]
pub struct KeyRing {
    default: Option<SymmetricKey>,
    nodes: HashMap<String, SymmetricKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ring that hands out the same key for every node.
    pub fn with_default(key: SymmetricKey) -> Self {
        Self {
            default: Some(key),
            nodes: HashMap::new(),
        }
    }

    pub fn set_default(&mut self, key: SymmetricKey) {
        self.default = Some(key);
    }

    pub fn insert(&mut self, node_uuid: impl Into<String>, key: SymmetricKey) {
        self.nodes.insert(node_uuid.into(), key);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.nodes.is_empty()
    }
}

#[async_trait]
impl KeyResolver for KeyRing {
    async fn resolve(&self, node_uuid: &str) -> Result<SymmetricKey, KeyError> {
        self.nodes
            .get(node_uuid)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| KeyError::NotFound(node_uuid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let k1 = generate_key().unwrap();
        let k2 = generate_key().unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        let err = SymmetricKey::from_slice(&[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            KeyError::InvalidLength {
                expected: 32,
                actual: 16
            }
        ));
        assert!(SymmetricKey::from_slice(&[0u8; 33]).is_err());
        assert!(SymmetricKey::from_slice(&[7u8; 32]).is_ok());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = SymmetricKey::from_bytes([0xABu8; KEY_SIZE]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }

    #[tokio::test]
    async fn test_ring_prefers_node_key() {
        let mut ring = KeyRing::with_default(SymmetricKey::from_bytes([1u8; KEY_SIZE]));
        ring.insert("abcd", SymmetricKey::from_bytes([2u8; KEY_SIZE]));

        let node_key = ring.resolve("abcd").await.unwrap();
        assert_eq!(node_key.as_bytes(), &[2u8; KEY_SIZE]);
        let shared = ring.resolve("other").await.unwrap();
        assert_eq!(shared.as_bytes(), &[1u8; KEY_SIZE]);
    }

    #[tokio::test]
    async fn test_ring_without_default_misses() {
        let mut ring = KeyRing::new();
        assert!(ring.is_empty());
        ring.insert("abcd", SymmetricKey::from_bytes([2u8; KEY_SIZE]));

        assert!(!ring.is_empty());
        assert!(!ring.has_default());
        assert_eq!(ring.node_count(), 1);
        assert!(matches!(ring.resolve("abce").await, Err(KeyError::NotFound(id)) if id == "abce"));
    }

    #[tokio::test]
    async fn test_closure_resolver() {
        let resolver = |node: &str| {
            if node == "abcd" {
                Ok(SymmetricKey::from_bytes([9u8; KEY_SIZE]))
            } else {
                Err(KeyError::NotFound(node.to_string()))
            }
        };
        assert!(resolver.resolve("abcd").await.is_ok());
        assert!(resolver.resolve("abce").await.is_err());
    }

    struct SlowBackend {
        delay: std::time::Duration,
    }

    #[async_trait]
    impl KeyResolver for SlowBackend {
        async fn resolve(&self, node_uuid: &str) -> Result<SymmetricKey, KeyError> {
            tokio::time::sleep(self.delay).await;
            match node_uuid {
                "abcd" => Ok(SymmetricKey::from_bytes([5u8; KEY_SIZE])),
                _ => Err(KeyError::Resolver("backend has no entry".into())),
            }
        }
    }

    #[tokio::test]
    async fn test_async_resolver_can_be_abandoned() {
        let backend = SlowBackend {
            delay: std::time::Duration::from_secs(30),
        };
        let lookup = backend.resolve("abcd");
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(20), lookup).await;
        assert!(outcome.is_err(), "lookup should still be pending");

        let quick = SlowBackend {
            delay: std::time::Duration::ZERO,
        };
        assert_eq!(quick.resolve("abcd").await.unwrap().as_bytes(), &[5u8; KEY_SIZE]);
    }
}
