//! Seal/unseal of fixed-size passphrases with AES-256-GCM
//!
//! Output of [`Sealer::seal`]: `[12-byte nonce][ciphertext + 16-byte tag]`, no AAD.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::error::SealError;
use crate::keys::{generate_key, KeyResolver, SymmetricKey};
use crate::{ENVELOPE_SIZE, NONCE_SIZE, PASSPHRASE_SIZE};

/// Stateless sealing service over an injected [`KeyResolver`].
///
/// Cheap to clone; all clones share the resolver.
#[derive(Clone)]
pub struct Sealer {
    resolver: Arc<dyn KeyResolver>,
}

impl Sealer {
    pub fn new(resolver: impl KeyResolver + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }

    pub fn from_shared(resolver: Arc<dyn KeyResolver>) -> Self {
        Self { resolver }
    }

    /// Encrypt `secret` under the key for `node_uuid`.
    ///
    /// `secret` must be exactly [`PASSPHRASE_SIZE`] bytes. Two calls with the
    /// same input never return the same envelope.
    pub async fn seal(&self, node_uuid: &str, secret: &[u8]) -> Result<Vec<u8>, SealError> {
        check_len(secret, PASSPHRASE_SIZE)?;

        let key = self.key_for(node_uuid).await?;
        let cipher = Aes256Gcm::new(key.as_bytes().into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.try_fill_bytes(&mut nonce_bytes)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, secret)
            .map_err(|_| SealError::Cipher)?;

        let mut envelope = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    /// Recover the passphrase sealed in `envelope`.
    ///
    /// `envelope` must be exactly [`ENVELOPE_SIZE`] bytes. If it does not
    /// authenticate under the key for `node_uuid` (wrong node, unknown node,
    /// tampered data) the result is [`PASSPHRASE_SIZE`] random bytes instead
    /// of an error. The returned buffer is wiped when dropped.
    pub async fn unseal(
        &self,
        node_uuid: &str,
        envelope: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, SealError> {
        check_len(envelope, ENVELOPE_SIZE)?;

        let key = self.key_for(node_uuid).await?;
        let cipher = Aes256Gcm::new(key.as_bytes().into());

        let (nonce_bytes, sealed) = envelope.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        match cipher.decrypt(nonce, sealed) {
            Ok(secret) => Ok(Zeroizing::new(secret)),
            Err(_) => random_secret(),
        }
    }

    async fn key_for(&self, node_uuid: &str) -> Result<SymmetricKey, SealError> {
        match self.resolver.resolve(node_uuid).await {
            Ok(key) => Ok(key),
            Err(e) => {
                tracing::debug!(node_uuid, "key resolution failed, using random key: {e}");
                Ok(generate_key()?)
            }
        }
    }
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer").finish_non_exhaustive()
    }
}

fn check_len(data: &[u8], expected: usize) -> Result<(), SealError> {
    if data.len() != expected {
        return Err(SealError::InvalidLength {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn random_secret() -> Result<Zeroizing<Vec<u8>>, SealError> {
    let mut secret = Zeroizing::new(vec![0u8; PASSPHRASE_SIZE]);
    OsRng.try_fill_bytes(&mut secret)?;
    Ok(secret)
}
