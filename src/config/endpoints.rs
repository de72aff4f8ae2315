//! Thor node endpoint configuration
//!
//! Per-network env vars take priority over the public VeChain nodes:
//!
//! ```bash
//! export THOR_MAINNET_URL="https://my-node.example"
//! export THOR_TESTNET_URL="https://my-testnet-node.example"
//! export THOR_SOLO_URL="http://localhost:8669"
//! ```

use super::Network;
use std::collections::HashMap;

/// Environment variable names
mod env_vars {
    pub const THOR_MAINNET_URL: &str = "THOR_MAINNET_URL";
    pub const THOR_TESTNET_URL: &str = "THOR_TESTNET_URL";
    pub const THOR_SOLO_URL: &str = "THOR_SOLO_URL";
}

/// Public nodes (rate limited)
mod public_nodes {
    pub const MAIN: &str = "https://mainnet.vechain.org";
    pub const TEST: &str = "https://testnet.vechain.org";
    pub const SOLO: &str = "http://localhost:8669";
}

/// Node base URLs indexed by network
#[derive(Debug, Clone)]
pub struct NodeEndpoints {
    urls: HashMap<Network, String>,
}

impl NodeEndpoints {
    /// Build from environment variables, falling back to public nodes
    pub fn from_env() -> Self {
        let urls = [Network::Main, Network::Test, Network::Solo]
            .into_iter()
            .map(|network| (network, Self::resolve(network)))
            .collect();
        Self { urls }
    }

    /// URL for a single network: its env var, else the public node
    pub fn resolve(network: Network) -> String {
        let var = Self::env_var(network);
        match std::env::var(var) {
            Ok(url) => {
                tracing::debug!(network = network.name(), "Using {} for node URL", var);
                url
            }
            Err(_) => {
                tracing::debug!(network = network.name(), "No node configured, using public node");
                Self::public_url(network).to_string()
            }
        }
    }

    fn env_var(network: Network) -> &'static str {
        match network {
            Network::Main => env_vars::THOR_MAINNET_URL,
            Network::Test => env_vars::THOR_TESTNET_URL,
            Network::Solo => env_vars::THOR_SOLO_URL,
        }
    }

    /// Create with explicit URLs
    pub fn with_urls(urls: HashMap<Network, String>) -> Self {
        Self { urls }
    }

    pub fn get(&self, network: Network) -> Option<&str> {
        self.urls.get(&network).map(|s| s.as_str())
    }

    pub fn public_url(network: Network) -> &'static str {
        match network {
            Network::Main => public_nodes::MAIN,
            Network::Test => public_nodes::TEST,
            Network::Solo => public_nodes::SOLO,
        }
    }
}

impl Default for NodeEndpoints {
    fn default() -> Self {
        Self::from_env()
    }
}
