//! Tracker configuration

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{address, Address};
use eyre::{eyre, Result, WrapErr};

use crate::address_codec::encode_stacks_recipient;
use crate::backoff::ProbeBackoffConfig;
use crate::types::Network;

/// xReserve domain id for Stacks (same on every network)
pub const STACKS_DOMAIN: u32 = 10003;

/// Contract addresses for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContracts {
    /// USDC ERC-20 on Ethereum
    pub usdc: Address,
    /// Circle xReserve on Ethereum
    pub xreserve: Address,
    pub stacks_domain: u32,
    /// USDCx token contract id (`ADDR.NAME`)
    pub usdcx_contract: String,
    /// USDCx fungible token asset name
    pub usdcx_asset: String,
    /// Vault contract id (`ADDR.NAME`); not deployed on every network
    pub vault_contract: Option<String>,
}

impl NetworkContracts {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self {
                usdc: address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                xreserve: address!("8888888199b2Df864bf678259607d6D5EBb4e3Ce"),
                stacks_domain: STACKS_DOMAIN,
                usdcx_contract: "SP120SBRBQJ00MCWS7TM5R8WJNTTKD5K0HFRC2CNE.usdcx".to_string(),
                usdcx_asset: "usdcx-token".to_string(),
                vault_contract: None,
            },
            Network::Testnet => Self {
                usdc: address!("1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
                xreserve: address!("008888878f94C0d87defdf0B07f46B93C1934442"),
                stacks_domain: STACKS_DOMAIN,
                usdcx_contract: "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM.usdcx".to_string(),
                usdcx_asset: "usdcx-token".to_string(),
                vault_contract: Some(
                    "ST2ZBRP21Z92YFT212XHZGF2G48HCPGBC8HBB8838.usdcx-vault-v2".to_string(),
                ),
            },
        }
    }

    /// Key of the USDCx entry in a Hiro balances response
    pub fn usdcx_token_key(&self) -> String {
        format!("{}::{}", self.usdcx_contract, self.usdcx_asset)
    }
}

/// Public endpoints used when nothing is configured
struct Endpoints {
    eth_rpc: &'static str,
    etherscan_api: &'static str,
    hiro_api: &'static str,
}

fn default_endpoints(network: Network) -> Endpoints {
    match network {
        Network::Mainnet => Endpoints {
            eth_rpc: "https://ethereum-rpc.publicnode.com",
            etherscan_api: "https://api.etherscan.io/api",
            hiro_api: "https://api.hiro.so",
        },
        Network::Testnet => Endpoints {
            eth_rpc: "https://ethereum-sepolia-rpc.publicnode.com",
            etherscan_api: "https://api-sepolia.etherscan.io/api",
            hiro_api: "https://api.testnet.hiro.so",
        },
    }
}

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub network: Network,
    pub contracts: NetworkContracts,

    /// Ethereum JSON-RPC URL (balance and allowance reads)
    pub eth_rpc_url: String,
    /// Etherscan API base, e.g. `https://api-sepolia.etherscan.io/api`
    pub etherscan_api_url: String,
    pub etherscan_api_key: Option<String>,
    /// Hiro Stacks API base
    pub hiro_api_url: String,

    /// JSON file backing the key/value store
    pub store_path: PathBuf,

    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Records older than this are dropped
    pub retention_secs: u64,
    /// Per-request HTTP timeout in milliseconds
    pub http_timeout_ms: u64,

    pub probe: ProbeBackoffConfig,

    /// Connected Stacks account, refreshed after completions
    pub stacks_address: Option<String>,
}

impl Config {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let network: Network = match var("NETWORK") {
            Some(raw) => raw.parse()?,
            None => Network::default(),
        };
        let endpoints = default_endpoints(network);

        let mut contracts = NetworkContracts::for_network(network);
        if let Some(vault) = var("VAULT_CONTRACT") {
            contracts.vault_contract = Some(vault);
        }

        let defaults = ProbeBackoffConfig::default();
        let probe = ProbeBackoffConfig {
            quiet_failures: parse_or(&var, "PROBE_QUIET_FAILURES", defaults.quiet_failures)?,
            surface_after: parse_or(&var, "PROBE_SURFACE_AFTER", defaults.surface_after)?,
            max_backoff: Duration::from_millis(parse_or(
                &var,
                "PROBE_MAX_BACKOFF_MS",
                defaults.max_backoff.as_millis() as u64,
            )?),
            ..defaults
        };

        let config = Self {
            network,
            contracts,
            eth_rpc_url: var("ETH_RPC_URL").unwrap_or_else(|| endpoints.eth_rpc.to_string()),
            etherscan_api_url: var("ETHERSCAN_API_URL")
                .unwrap_or_else(|| endpoints.etherscan_api.to_string()),
            etherscan_api_key: var("ETHERSCAN_API_KEY"),
            hiro_api_url: var("HIRO_API_URL").unwrap_or_else(|| endpoints.hiro_api.to_string()),
            store_path: var("STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("usdcx-tracker.json")),
            poll_interval_ms: parse_or(&var, "POLL_INTERVAL_MS", 15_000)?,
            retention_secs: parse_or(&var, "RETENTION_SECS", 7_200)?,
            http_timeout_ms: parse_or(&var, "HTTP_TIMEOUT_MS", 30_000)?,
            probe,
            stacks_address: var("STACKS_ADDRESS"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(eyre!("POLL_INTERVAL_MS must be greater than zero"));
        }
        if self.retention_secs == 0 {
            return Err(eyre!("RETENTION_SECS must be greater than zero"));
        }
        if self.http_timeout_ms == 0 {
            return Err(eyre!("HTTP_TIMEOUT_MS must be greater than zero"));
        }
        if self.probe.surface_after == 0 {
            return Err(eyre!("PROBE_SURFACE_AFTER must be at least 1"));
        }

        for (name, value) in [
            ("ETH_RPC_URL", &self.eth_rpc_url),
            ("ETHERSCAN_API_URL", &self.etherscan_api_url),
            ("HIRO_API_URL", &self.hiro_api_url),
        ] {
            url::Url::parse(value).wrap_err_with(|| format!("Invalid {}: {}", name, value))?;
        }

        if let Some(address) = &self.stacks_address {
            encode_stacks_recipient(address)
                .wrap_err_with(|| format!("Invalid STACKS_ADDRESS: {}", address))?;
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| eyre!("Invalid {}: {:?} ({})", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_are_testnet() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.retention(), Duration::from_secs(2 * 60 * 60));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert_eq!(config.hiro_api_url, "https://api.testnet.hiro.so");
        assert_eq!(config.probe.quiet_failures, 3);
        assert_eq!(config.etherscan_api_key, None);
        assert_eq!(
            config.contracts.usdcx_token_key(),
            "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM.usdcx::usdcx-token"
        );
    }

    #[test]
    fn test_mainnet_contracts() {
        let config = config_from(&[("NETWORK", "mainnet")]).unwrap();
        assert_eq!(
            config.contracts.usdc,
            address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")
        );
        assert_eq!(config.contracts.stacks_domain, 10003);
        assert_eq!(config.contracts.vault_contract, None);
        assert_eq!(config.hiro_api_url, "https://api.hiro.so");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("POLL_INTERVAL_MS", "1000"),
            ("RETENTION_SECS", "60"),
            ("ETHERSCAN_API_KEY", "abc"),
            ("PROBE_SURFACE_AFTER", "7"),
            ("STORE_PATH", "/tmp/state.json"),
            ("STACKS_ADDRESS", "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM"),
        ])
        .unwrap();
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.retention_secs, 60);
        assert_eq!(config.etherscan_api_key.as_deref(), Some("abc"));
        assert_eq!(config.probe.surface_after, 7);
        assert_eq!(config.store_path, PathBuf::from("/tmp/state.json"));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config_from(&[("ETHERSCAN_API_KEY", "  "), ("NETWORK", "")]).unwrap();
        assert_eq!(config.etherscan_api_key, None);
        assert_eq!(config.network, Network::Testnet);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(config_from(&[("NETWORK", "devnet")]).is_err());
        assert!(config_from(&[("POLL_INTERVAL_MS", "soon")]).is_err());
        assert!(config_from(&[("POLL_INTERVAL_MS", "0")]).is_err());
        assert!(config_from(&[("HIRO_API_URL", "not a url")]).is_err());
        assert!(config_from(&[("STACKS_ADDRESS", "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGN")]).is_err());
    }
}
