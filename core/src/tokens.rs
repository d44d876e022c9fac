/// Chains and token slugs
use crate::account::Network;
use crate::error::{Result, WalletError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const TONCOIN_SLUG: &str = "toncoin";
pub const TRX_SLUG: &str = "trx";

const TRC20_USDT_MAINNET_ADDRESS: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
const TRC20_USDT_TESTNET_ADDRESS: &str = "TG3XXyExBkPp9nzdajDZsozEu4BkaSJozs";

/// Slug length budget taken from the token address
const SLUG_ADDRESS_PART_LEN: usize = 10;

/// Supported blockchains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ton,
    Tron,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::Ton, Chain::Tron];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ton => "ton",
            Chain::Tron => "tron",
        }
    }

    /// Slug of the chain's native coin
    pub fn native_slug(&self) -> &'static str {
        match self {
            Chain::Ton => TONCOIN_SLUG,
            Chain::Tron => TRX_SLUG,
        }
    }

    /// Whether transfers are confirmed through an external message hash
    /// rather than a transaction id known at submission time
    pub fn uses_message_hash(&self) -> bool {
        matches!(self, Chain::Ton)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ton" => Ok(Chain::Ton),
            "tron" => Ok(Chain::Tron),
            other => Err(WalletError::UnknownChain(other.to_string())),
        }
    }
}

/// Build the slug of a token contract: `<chain>-<first 10 alphanumerics>`, lowercased
pub fn build_token_slug(chain: Chain, address: &str) -> String {
    let address_part: String = address
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(SLUG_ADDRESS_PART_LEN)
        .collect();
    format!("{}-{}", chain.as_str(), address_part).to_lowercase()
}

/// Resolve the chain a slug belongs to
pub fn chain_by_slug(slug: &str) -> Result<Chain> {
    match slug {
        TONCOIN_SLUG => return Ok(Chain::Ton),
        TRX_SLUG => return Ok(Chain::Tron),
        _ => {}
    }
    let prefix = slug.split('-').next().unwrap_or_default();
    prefix.parse()
}

/// Slug for a transfer: the token contract's slug, or the native coin
pub fn transfer_slug(chain: Chain, token_address: Option<&str>) -> String {
    match token_address {
        Some(address) => build_token_slug(chain, address),
        None => chain.native_slug().to_string(),
    }
}

/// Tokens tracked by default on TRON
pub fn tron_token_slugs(network: Network) -> [String; 2] {
    let usdt_address = match network {
        Network::Mainnet => TRC20_USDT_MAINNET_ADDRESS,
        Network::Testnet => TRC20_USDT_TESTNET_ADDRESS,
    };
    [TRX_SLUG.to_string(), build_token_slug(Chain::Tron, usdt_address)]
}
