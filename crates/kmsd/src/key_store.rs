//! Key store: loads key files named in the config into a [`KeyRing`]

use base64::Engine;
use kms_core::config::{KeyFormat, KeysConfig};
use kms_core::{KmsError, KmsResult};
use kms_crypto::{KeyRing, SymmetricKey};
use std::path::Path;
use tracing::{info, warn};
use zeroize::Zeroize;

/// Build the key ring from the `[keys]` section.
///
/// Every configured file must decode to a valid key; a bad file fails startup
/// instead of silently sealing that node under random keys.
pub fn load_key_ring(keys: &KeysConfig) -> KmsResult<KeyRing> {
    let mut ring = KeyRing::new();

    if let Some(path) = &keys.key_path {
        ring.set_default(read_key_file(path, keys.key_format)?);
        info!(path = %path.display(), "default key loaded");
    }

    for (node_uuid, path) in &keys.nodes {
        ring.insert(node_uuid.clone(), read_key_file(path, keys.key_format)?);
    }
    if !keys.nodes.is_empty() {
        info!(nodes = keys.nodes.len(), "node keys loaded");
    }

    if ring.is_empty() {
        return Err(KmsError::Config("--key-path is not set".into()));
    }
    Ok(ring)
}

/// Read and decode a single key file.
pub fn read_key_file(path: &Path, format: KeyFormat) -> KmsResult<SymmetricKey> {
    let mut raw = std::fs::read(path).map_err(|e| KmsError::KeyFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    warn_if_world_readable(path);

    let key = decode_key(&raw, format).map_err(|reason| KmsError::KeyFile {
        path: path.to_path_buf(),
        reason,
    });
    raw.zeroize();
    key
}

fn decode_key(raw: &[u8], format: KeyFormat) -> Result<SymmetricKey, String> {
    match format {
        KeyFormat::Raw => SymmetricKey::from_slice(raw).map_err(|e| e.to_string()),
        KeyFormat::Base64 => {
            let text = std::str::from_utf8(raw).map_err(|_| "key file is not UTF-8".to_string())?;
            let mut decoded = base64::engine::general_purpose::STANDARD
                .decode(text.trim())
                .map_err(|e| format!("invalid base64: {e}"))?;
            let key = SymmetricKey::from_slice(&decoded).map_err(|e| e.to_string());
            decoded.zeroize();
            key
        }
    }
}

#[cfg(unix)]
fn warn_if_world_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        if meta.permissions().mode() & 0o004 != 0 {
            warn!(path = %path.display(), "key file is world-readable");
        }
    }
}

#[cfg(not(unix))]
fn warn_if_world_readable(_path: &Path) {}
