/// Wallet accounts and their per-chain addresses
use crate::error::{Result, WalletError};
use crate::tokens::Chain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(WalletError::Protocol(format!("Unknown network: {}", other))),
        }
    }
}

/// Account id components. Ids look like `0-mainnet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAccountId {
    pub index: u32,
    pub network: Network,
}

pub fn parse_account_id(account_id: &str) -> Result<ParsedAccountId> {
    let (index, network) = account_id
        .split_once('-')
        .ok_or_else(|| WalletError::Protocol(format!("Invalid account id: {}", account_id)))?;
    let index = index
        .parse::<u32>()
        .map_err(|_| WalletError::Protocol(format!("Invalid account index: {}", account_id)))?;
    Ok(ParsedAccountId {
        index,
        network: network.parse()?,
    })
}

pub fn build_account_id(index: u32, network: Network) -> String {
    format!("{}-{}", index, network)
}

/// A wallet account known to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Wallet address per chain the account holds
    pub addresses: BTreeMap<Chain, String>,
    /// Import time (ms since epoch), if the account was imported rather than created
    #[serde(default)]
    pub imported_at: Option<i64>,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            addresses: BTreeMap::new(),
            imported_at: None,
        }
    }

    pub fn with_address(mut self, chain: Chain, address: impl Into<String>) -> Self {
        self.addresses.insert(chain, address.into());
        self
    }

    pub fn address(&self, chain: Chain) -> Option<&str> {
        self.addresses.get(&chain).map(String::as_str)
    }

    pub fn has_chain(&self, chain: Chain) -> bool {
        self.addresses.contains_key(&chain)
    }

    pub fn network(&self) -> Result<Network> {
        Ok(parse_account_id(&self.id)?.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account_id() {
        let parsed = parse_account_id("3-testnet").unwrap();
        assert_eq!(parsed.index, 3);
        assert_eq!(parsed.network, Network::Testnet);
        assert_eq!(build_account_id(3, Network::Testnet), "3-testnet");

        assert!(parse_account_id("mainnet").is_err());
        assert!(parse_account_id("x-mainnet").is_err());
        assert!(parse_account_id("0-devnet").is_err());
    }

    #[test]
    fn test_account_addresses() {
        let account = Account::new("0-mainnet").with_address(Chain::Ton, "UQabc");
        assert!(account.has_chain(Chain::Ton));
        assert!(!account.has_chain(Chain::Tron));
        assert_eq!(account.address(Chain::Ton), Some("UQabc"));
        assert_eq!(account.network().unwrap(), Network::Mainnet);
    }
}
