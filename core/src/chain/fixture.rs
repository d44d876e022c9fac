/// In-memory chain backend: serves recorded activities with real paging semantics.
/// Backs the demo daemon and the test suites.
use super::{ChainAdapter, SignedTransfer, SubmittedTransfer, TransferOptions};
use crate::account::{Account, Network};
use crate::activity::{sort_activities, Activity};
use crate::error::{Result, WalletError};
use crate::tokens::Chain;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
pub struct FixtureChain {
    chain: Chain,
    activities: Arc<RwLock<HashMap<String, Vec<Activity>>>>,
    latency: Duration,
    unavailable: Arc<AtomicBool>,
    rejection: Arc<RwLock<Option<String>>>,
    fetch_calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    submitted: Arc<RwLock<Vec<TransferOptions>>>,
}

impl FixtureChain {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            activities: Arc::new(RwLock::new(HashMap::new())),
            latency: Duration::ZERO,
            unavailable: Arc::new(AtomicBool::new(false)),
            rejection: Arc::new(RwLock::new(None)),
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            submitted: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Simulated round-trip time of every fetch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn push(&self, account_id: &str, activities: impl IntoIterator<Item = Activity>) {
        let mut all = self.activities.write().await;
        let list = all.entry(account_id.to_string()).or_default();
        list.extend(activities);
        sort_activities(list);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next submissions fail with `reason`
    pub async fn reject_submissions(&self, reason: Option<String>) {
        *self.rejection.write().await = reason;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn submitted(&self) -> Vec<TransferOptions> {
        self.submitted.read().await.clone()
    }
}

#[async_trait]
impl ChainAdapter for FixtureChain {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn fetch_page(
        &self,
        account: &Account,
        token_slug: Option<&str>,
        before_timestamp: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Activity>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WalletError::SourceUnavailable(format!("{} fixture offline", self.chain)));
        }

        let all = self.activities.read().await;
        let page: Vec<Activity> = all
            .get(&account.id)
            .map(|list| {
                list.iter()
                    .filter(|a| token_slug.map_or(true, |slug| a.slugs().contains(&slug)))
                    .filter(|a| before_timestamp.map_or(true, |before| a.timestamp() < before))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            "{} fixture page for {}: {} items before {:?}",
            self.chain,
            account.id,
            page.len(),
            before_timestamp
        );
        Ok(page)
    }

    async fn submit_transfer(&self, options: &TransferOptions) -> Result<SubmittedTransfer> {
        if let Some(reason) = self.rejection.read().await.clone() {
            return Err(WalletError::Submission(reason));
        }
        self.submitted.write().await.push(options.clone());

        let id = uuid::Uuid::new_v4().simple().to_string();
        if self.chain.uses_message_hash() {
            Ok(SubmittedTransfer::Message {
                msg_hash_normalized: id,
                encrypted_comment: None,
                payment_link: None,
                with_w5_gasless: false,
            })
        } else {
            Ok(SubmittedTransfer::Transaction { tx_id: id })
        }
    }

    async fn send_signed_message(
        &self,
        _account: &Account,
        message: &SignedTransfer,
        _pending_transfer_id: &str,
    ) -> Result<String> {
        if message.base64.is_empty() {
            return Err(WalletError::Submission("Empty signed message".to_string()));
        }
        Ok(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Friendly TON addresses: url-safe alphabet, non-bounceable tag on mainnet
    fn normalize_address(&self, address: &str, network: Network) -> String {
        match self.chain {
            Chain::Ton => {
                let url_safe = address.replace('+', "-").replace('/', "_");
                match (network, url_safe.strip_prefix("EQ")) {
                    (Network::Mainnet, Some(rest)) => format!("UQ{}", rest),
                    _ => url_safe,
                }
            }
            Chain::Tron => address.to_string(),
        }
    }
}

/// On-disk fixture layout for the daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureFile {
    pub accounts: Vec<FixtureAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureAccount {
    pub account: Account,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl FixtureFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(WalletError::Io)?;
        serde_json::from_slice(&raw).map_err(WalletError::Serialization)
    }

    /// One fixture backend per chain, populated from the file
    pub async fn into_chains(self) -> (Vec<Account>, Vec<FixtureChain>) {
        let chains: Vec<FixtureChain> = Chain::ALL.iter().map(|c| FixtureChain::new(*c)).collect();
        let mut accounts = Vec::new();
        for entry in self.accounts {
            for chain in &chains {
                let own: Vec<Activity> = entry
                    .activities
                    .iter()
                    .filter(|a| a.chain() == chain.chain)
                    .cloned()
                    .collect();
                chain.push(&entry.account.id, own).await;
            }
            accounts.push(entry.account);
        }
        (accounts, chains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::fixtures::{tx, tx_on};

    #[tokio::test]
    async fn test_fixture_paging() {
        let chain = FixtureChain::new(Chain::Ton);
        chain
            .push("0-mainnet", (1..=5).map(|i| tx(&format!("t{}", i), i * 10)))
            .await;
        let account = Account::new("0-mainnet");

        let first = chain.fetch_page(&account, None, None, 2).await.unwrap();
        assert_eq!(first.iter().map(|a| a.timestamp()).collect::<Vec<_>>(), vec![50, 40]);

        let next = chain.fetch_page(&account, None, Some(40), 10).await.unwrap();
        assert_eq!(next.iter().map(|a| a.timestamp()).collect::<Vec<_>>(), vec![30, 20, 10]);
        assert_eq!(chain.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_fixture_token_filter_and_outage() {
        let chain = FixtureChain::new(Chain::Tron);
        chain
            .push(
                "0-mainnet",
                vec![tx_on(Chain::Tron, "trx", "a", 2), tx_on(Chain::Tron, "tron-usdt", "b", 1)],
            )
            .await;
        let account = Account::new("0-mainnet");

        let usdt = chain.fetch_page(&account, Some("tron-usdt"), None, 10).await.unwrap();
        assert_eq!(usdt.len(), 1);
        assert_eq!(usdt[0].id(), "b");

        chain.set_unavailable(true);
        let err = chain.fetch_page(&account, None, None, 10).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_ton_normalization() {
        let chain = FixtureChain::new(Chain::Ton);
        assert_eq!(chain.normalize_address("EQab+c/d", Network::Mainnet), "UQab-c_d");
        assert_eq!(chain.normalize_address("EQab+c/d", Network::Testnet), "EQab-c_d");
    }
}
