//! kms-crypto: passphrase sealing for the KMS
//!
//! A node asks the KMS to seal a locally generated passphrase and later to
//! unseal it again. Keys are looked up per node through a [`KeyResolver`].
//!
//! Envelope format (binary):
//! ```text
//! [12 bytes: random nonce][32 bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! Neither an unknown node nor a failed authentication is reported to the
//! caller: an unknown node is sealed/unsealed under a throwaway random key,
//! and an envelope that does not authenticate unseals to random bytes.

pub mod envelope;
pub mod error;
pub mod keys;

pub use async_trait::async_trait;
pub use envelope::Sealer;
pub use error::{KeyError, SealError};
pub use keys::{generate_key, KeyResolver, KeyRing, SymmetricKey};

/// Size of a sealed passphrase in bytes
pub const PASSPHRASE_SIZE: usize = 32;

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a complete envelope as returned by [`Sealer::seal`]
pub const ENVELOPE_SIZE: usize = NONCE_SIZE + PASSPHRASE_SIZE + TAG_SIZE;
