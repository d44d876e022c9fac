/// Chain adapter capability: the engine's only view of a blockchain backend
pub mod fixture;

use crate::account::{Account, Network};
use crate::activity::Activity;
use crate::error::{Result, WalletError};
use crate::local::LocalTransactionParams;
use crate::tokens::Chain;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use fixture::FixtureChain;

/// Parameters of an outgoing transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOptions {
    pub account_id: String,
    pub to_address: String,
    /// Base units
    pub amount: u128,
    /// Token contract; `None` sends the native coin
    #[serde(default)]
    pub token_address: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub should_encrypt: bool,
    /// Fee estimate passed to the chain
    #[serde(default)]
    pub fee: Option<u128>,
    /// Fee actually charged, when known; recorded on the local activity
    #[serde(default)]
    pub real_fee: Option<u128>,
}

/// What a chain hands back once it accepted a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmittedTransfer {
    /// The transaction id is final at submission time
    Transaction { tx_id: String },
    /// Confirmation arrives later; the normalized message hash joins both records
    Message {
        msg_hash_normalized: String,
        #[serde(default)]
        encrypted_comment: Option<String>,
        #[serde(default)]
        payment_link: Option<String>,
        #[serde(default)]
        with_w5_gasless: bool,
    },
}

/// A message signed outside the engine (e.g. on a hardware wallet)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransfer {
    pub base64: String,
    pub local_activity: LocalTransactionParams,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    /// One page of activities, newest first, strictly older than `before_timestamp`.
    /// Any error is treated as the source being unavailable.
    async fn fetch_page(
        &self,
        account: &Account,
        token_slug: Option<&str>,
        before_timestamp: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Activity>>;

    async fn submit_transfer(&self, options: &TransferOptions) -> Result<SubmittedTransfer>;

    /// Broadcast an externally signed message; returns its normalized hash
    async fn send_signed_message(
        &self,
        _account: &Account,
        _message: &SignedTransfer,
        _pending_transfer_id: &str,
    ) -> Result<String> {
        Err(WalletError::Submission(format!(
            "{} does not accept signed messages",
            self.chain()
        )))
    }

    /// Canonical form of an address under the chain's addressing rules
    fn normalize_address(&self, address: &str, _network: Network) -> String {
        address.to_string()
    }
}

/// Adapters by chain
#[derive(Clone, Default)]
pub struct ChainRegistry {
    adapters: BTreeMap<Chain, Arc<dyn ChainAdapter>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, chain: Chain) -> Result<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or_else(|| WalletError::UnknownChain(chain.to_string()))
    }

    pub fn find(&self, chain: Chain) -> Option<&Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain)
    }

    pub fn chains(&self) -> Vec<Chain> {
        self.adapters.keys().copied().collect()
    }
}
