use thiserror::Error;

/// Errors returned by [`crate::Sealer`].
///
/// Authentication failures and unknown nodes are deliberately absent.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("incorrect data length: got {actual} bytes, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("random source failure: {0}")]
    Rng(#[from] rand::Error),

    #[error("AES-GCM encryption failed")]
    Cipher,
}

impl SealError {
    /// True for errors caused by a malformed request rather than a server fault.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, SealError::InvalidLength { .. })
    }
}

/// Errors from key construction and resolution.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no key for node {0}")]
    NotFound(String),

    #[error("invalid key length: {actual} bytes (expected {expected})")]
    InvalidLength { expected: usize, actual: usize },

    #[error("key resolution failed: {0}")]
    Resolver(String),
}
