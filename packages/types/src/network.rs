use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{ChainName, Credential};

/// How to reach one chain and its block explorer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct NetworkConfig {
    pub rpc_endpoint: String,
    /// Network name understood by the verification tool, e.g. `bscTestnet`
    pub tool_network: String,
    /// Explorer api key. Unset or blank means verification is skipped for this chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub verification_api_key: Option<Credential>,
    /// Well known contracts on this chain (routers, wrapped native tokens, ...)
    #[serde(default)]
    pub contracts: BTreeMap<String, String>,
}

impl NetworkConfig {
    pub fn new(rpc_endpoint: impl ToString, tool_network: impl ToString) -> Self {
        Self {
            rpc_endpoint: rpc_endpoint.to_string(),
            tool_network: tool_network.to_string(),
            verification_api_key: None,
            contracts: BTreeMap::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.verification_api_key = Some(Credential::new(key));
        self
    }

    pub fn with_contract(mut self, name: &str, address: &str) -> Self {
        self.contracts.insert(name.to_string(), address.to_string());
        self
    }

    pub fn verification_key(&self) -> Option<&Credential> {
        self.verification_api_key
            .as_ref()
            .filter(|key| !key.is_blank())
    }
}

/// All chains the service can deploy to and verify on, keyed by chain name
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, ToSchema)]
#[serde(transparent)]
pub struct NetworkTable(BTreeMap<ChainName, NetworkConfig>);

impl NetworkTable {
    pub fn new(networks: BTreeMap<ChainName, NetworkConfig>) -> Self {
        Self(networks)
    }

    pub fn get(&self, chain: &str) -> Option<&NetworkConfig> {
        self.0.get(chain)
    }

    pub fn insert(&mut self, chain: ChainName, network: NetworkConfig) {
        self.0.insert(chain, network);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChainName, &NetworkConfig)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ChainName, &mut NetworkConfig)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Public chains supported out of the box.
    /// Api keys are environment references, resolved when the config is loaded.
    pub fn defaults() -> Self {
        let networks = [
            (
                "bsc",
                NetworkConfig::new("https://bsc-dataseed.binance.org/", "bsc")
                    .with_api_key("$BSCSCAN_API_KEY")
                    .with_contract("pancakeRouter", "0x10ED43C718714eb63d5aA57B78B54704E256024E")
                    .with_contract("wrappedNative", "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"),
            ),
            (
                "bsc-testnet",
                NetworkConfig::new(
                    "https://data-seed-prebsc-1-s1.binance.org:8545",
                    "bscTestnet",
                )
                .with_api_key("$BSCSCAN_API_KEY")
                .with_contract("pancakeRouter", "0xD99D1c33F9fC3444f8101754aBC46c52416550D1"),
            ),
            (
                "ethereum",
                NetworkConfig::new("https://eth.llamarpc.com", "mainnet")
                    .with_api_key("$ETHERSCAN_API_KEY")
                    .with_contract("uniswapRouter", "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D")
                    .with_contract("wrappedNative", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            ),
            (
                "ethereum-testnet",
                NetworkConfig::new("https://rpc.sepolia.org", "sepolia")
                    .with_api_key("$ETHERSCAN_API_KEY"),
            ),
            (
                "somnia-mainnet",
                NetworkConfig::new("https://api.infra.mainnet.somnia.network/", "somniaMainnet"),
            ),
            (
                "somnia-testnet",
                NetworkConfig::new("https://dream-rpc.somnia.network/", "somniaTestnet"),
            ),
        ];

        Self(
            networks
                .into_iter()
                .filter_map(|(name, network)| Some((ChainName::new(name).ok()?, network)))
                .collect(),
        )
    }
}

/// Timing and invocation of the external source verification tool
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(default)]
pub struct VerificationSettings {
    /// Wait before the first attempt, for the explorer to index the deployment
    pub initial_delay_secs: u64,
    /// One retry per entry, sleeping that long before it
    pub retry_delays_secs: Vec<u64>,
    /// Upper bound on a single tool invocation
    pub attempt_timeout_secs: u64,
    pub program: String,
    /// Leading arguments, before `--network ...`
    pub args: Vec<String>,
    /// Working directory for the tool, usually the contracts project
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub project_dir: Option<PathBuf>,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: 30,
            retry_delays_secs: vec![30, 45, 60, 90],
            attempt_timeout_secs: 180,
            program: "npx".to_string(),
            args: vec!["hardhat".to_string(), "verify".to_string()],
            project_dir: None,
        }
    }
}

impl VerificationSettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn retry_delays(&self) -> impl Iterator<Item = Duration> + '_ {
        self.retry_delays_secs.iter().map(|s| Duration::from_secs(*s))
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> usize {
        self.retry_delays_secs.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_networks() {
        let table = NetworkTable::defaults();
        assert_eq!(table.len(), 6);
        assert_eq!(table.get("bsc-testnet").unwrap().tool_network, "bscTestnet");
        assert_eq!(table.get("ethereum").unwrap().tool_network, "mainnet");
        assert!(table.get("somnia-testnet").unwrap().verification_key().is_none());
        assert!(table.get("MARS_MAINNET").is_none());
    }

    #[test]
    fn blank_api_key_means_no_verification() {
        let network = NetworkConfig::new("http://localhost:8545", "localhost").with_api_key(" ");
        assert!(network.verification_key().is_none());

        let network = network.with_api_key("abc");
        assert_eq!(network.verification_key().unwrap().as_str(), "abc");
    }

    #[test]
    fn default_retry_schedule() {
        let settings = VerificationSettings::default();
        assert_eq!(settings.initial_delay(), Duration::from_secs(30));
        assert_eq!(
            settings.retry_delays().collect::<Vec<_>>(),
            [30, 45, 60, 90].map(Duration::from_secs).to_vec()
        );
        assert_eq!(settings.max_attempts(), 5);
    }
}
