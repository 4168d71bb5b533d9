//! Ethereum reads: USDC balance and xReserve allowance

use std::str::FromStr;

use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use alloy::sol;
use eyre::{eyre, Result, WrapErr};
use tracing::debug;

use crate::config::NetworkContracts;

sol! {
    /// Subset of the USDC ERC-20 interface
    #[sol(rpc)]
    contract Usdc {
        function balanceOf(address account) external view returns (uint256 balance);

        function allowance(address owner, address spender) external view returns (uint256 remaining);
    }
}

pub struct EthereumClient {
    rpc_url: String,
    usdc: Address,
    xreserve: Address,
}

impl EthereumClient {
    pub fn new(rpc_url: impl Into<String>, contracts: &NetworkContracts) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            usdc: contracts.usdc,
            xreserve: contracts.xreserve,
        }
    }

    /// USDC balance of `owner` in base units
    pub async fn usdc_balance(&self, owner: &str) -> Result<u128> {
        let owner = parse_address(owner)?;
        let provider =
            ProviderBuilder::new().on_http(self.rpc_url.parse().wrap_err("Invalid RPC URL")?);
        let contract = Usdc::new(self.usdc, &provider);

        let balance = contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| eyre!("Failed to query USDC balance: {}", e))?
            .balance;

        debug!(owner = %owner, %balance, "USDC balance");
        balance
            .try_into()
            .map_err(|_| eyre!("USDC balance out of range: {}", balance))
    }

    /// USDC amount `owner` has approved for the xReserve contract
    pub async fn usdc_allowance(&self, owner: &str) -> Result<u128> {
        let owner = parse_address(owner)?;
        let provider =
            ProviderBuilder::new().on_http(self.rpc_url.parse().wrap_err("Invalid RPC URL")?);
        let contract = Usdc::new(self.usdc, &provider);

        let remaining = contract
            .allowance(owner, self.xreserve)
            .call()
            .await
            .map_err(|e| eyre!("Failed to query USDC allowance: {}", e))?
            .remaining;

        remaining
            .try_into()
            .map_err(|_| eyre!("USDC allowance out of range: {}", remaining))
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).wrap_err_with(|| format!("Invalid Ethereum address: {}", raw))
}
