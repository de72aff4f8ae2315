//! Configuration for the wallet core

pub mod endpoints;

use crate::storage::KdfParams;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use endpoints::NodeEndpoints;

/// Overrides the node base URL for the selected network
pub const NODE_URL_ENV: &str = "THOR_NODE_URL";
/// Default fee-delegation (sponsor) endpoint
pub const DELEGATE_URL_ENV: &str = "VEWORLD_DELEGATE_URL";
/// Directory for the file-backed secure storage
pub const STORAGE_DIR_ENV: &str = "VEWORLD_STORAGE_DIR";

const MIN_TIMEOUT_MS: u64 = 5_000;
const MAX_TIMEOUT_MS: u64 = 20_000;

/// Fixed identifiers of the encrypted stores
pub mod store_keys {
    pub const DEVICES: &str = "veworld-devices";
    pub const WALLET: &str = "vechain-wallet";
}

/// Supported VeChain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Main,
    Test,
    Solo,
}

impl Network {
    pub fn genesis_id(&self) -> &'static str {
        match self {
            Network::Main => "0x00000000851caf3cfdb6e899cf5958bfb1ac3413d346d43539627e6be7ec1b4a",
            Network::Test => "0x000000000b2bce3c70bc649a02749e8687721b09ed2e15997f466536b20bb127",
            Network::Solo => "0x00000000c05a20fbca2bf6ae3affba6af4a74b800b585bf7a4988aba7aea69f6",
        }
    }

    /// Chain tag: the last byte of the genesis block id
    pub fn chain_tag(&self) -> u8 {
        match self {
            Network::Main => 0x4a,
            Network::Test => 0x27,
            Network::Solo => 0xf6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Test => "test",
            Network::Solo => "solo",
        }
    }

    pub fn from_chain_tag(tag: u8) -> Option<Self> {
        [Network::Main, Network::Test, Network::Solo]
            .into_iter()
            .find(|n| n.chain_tag() == tag)
    }
}

impl std::str::FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "main" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Test),
            "solo" => Ok(Network::Solo),
            other => Err(Error::Config(format!("Unknown network: {}", other))),
        }
    }
}

/// HTTP timeouts for the sponsor and node calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub sponsor_timeout_ms: u64,
    pub broadcast_timeout_ms: u64,
}

impl HttpConfig {
    pub fn sponsor_timeout(&self) -> Duration {
        Duration::from_millis(self.sponsor_timeout_ms)
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            sponsor_timeout_ms: 10_000,
            broadcast_timeout_ms: 15_000,
        }
    }
}

/// Secure storage settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory for file-backed storage; in-memory when unset
    #[serde(default)]
    pub dir: Option<String>,
    /// scrypt parameters for newly written secrets
    #[serde(default)]
    pub kdf: KdfParams,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: Network,
    /// Explicit node base URL; falls back to the network endpoint table
    #[serde(default)]
    pub node_url: Option<String>,
    /// Sponsor endpoint used when a transaction asks for URL delegation
    #[serde(default)]
    pub delegate_url: Option<String>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Main,
            node_url: None,
            delegate_url: None,
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load from an optional JSON file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&content)
                    .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?
            }
            None => Config::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(NODE_URL_ENV) {
            tracing::debug!("Using {} for the node URL", NODE_URL_ENV);
            self.node_url = Some(url);
        }
        if let Ok(url) = std::env::var(DELEGATE_URL_ENV) {
            tracing::debug!("Using {} for the sponsor URL", DELEGATE_URL_ENV);
            self.delegate_url = Some(url);
        }
        if let Ok(dir) = std::env::var(STORAGE_DIR_ENV) {
            self.storage.dir = Some(dir);
        }
    }

    /// Reject unusable values early rather than at first network call
    pub fn validate(&self) -> Result<()> {
        for (name, ms) in [
            ("sponsor_timeout_ms", self.http.sponsor_timeout_ms),
            ("broadcast_timeout_ms", self.http.broadcast_timeout_ms),
        ] {
            if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&ms) {
                return Err(Error::Config(format!(
                    "{} must be between 5000 and 20000, got {}",
                    name, ms
                )));
            }
        }
        if let Some(url) = &self.node_url {
            url::Url::parse(url).map_err(|e| Error::Config(format!("node_url: {}", e)))?;
        }
        if let Some(url) = &self.delegate_url {
            url::Url::parse(url).map_err(|e| Error::Config(format!("delegate_url: {}", e)))?;
        }
        self.storage.kdf.validate()?;
        Ok(())
    }

    /// Node base URL for the configured network
    pub fn node_url(&self) -> String {
        match &self.node_url {
            Some(url) => url.clone(),
            None => NodeEndpoints::resolve(self.network),
        }
    }
}
