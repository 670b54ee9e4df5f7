use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{KmsError, KmsResult};

/// Top-level daemon configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsConfig {
    pub server: ServerConfig,
    pub keys: KeysConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP listen address for the gRPC API (default: 0.0.0.0:4050)
    pub listen: String,
    /// Prometheus metrics and health endpoint (optional)
    pub metrics_addr: Option<String>,
    /// Artificial delay before answering each Seal/Unseal call, in milliseconds
    pub response_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Key used for every node without an entry in `nodes`
    pub key_path: Option<PathBuf>,
    /// Encoding of all key files
    pub key_format: KeyFormat,
    /// Per-node key files, keyed by node UUID
    pub nodes: BTreeMap<String, PathBuf>,
}

/// On-disk encoding of a key file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// Exactly 32 raw bytes
    #[default]
    Raw,
    /// Standard base64 text, surrounding whitespace ignored
    Base64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:4050".into(),
            metrics_addr: Some("127.0.0.1:9150".into()),
            response_delay_ms: 0,
        }
    }
}

impl KmsConfig {
    /// Read the config at `path`, or fall back to defaults if it does not exist.
    pub fn load(path: &Path) -> KmsResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| KmsError::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Check that at least one key source is configured.
    pub fn validate(&self) -> KmsResult<()> {
        if self.keys.key_path.is_none() && self.keys.nodes.is_empty() {
            return Err(KmsError::Config("--key-path is not set".into()));
        }
        if self.server.listen.is_empty() {
            return Err(KmsError::Config("listen address is empty".into()));
        }
        Ok(())
    }
}
