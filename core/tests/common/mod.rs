#![allow(dead_code)]
/// Shared helpers for the engine integration tests

use std::sync::Arc;
use std::time::Duration;
use walletfeed_core::activity::{ActivityStatus, TransactionActivity, TransactionExtra};
use walletfeed_core::{Account, Activity, ActivityEngine, Chain, ChainRegistry, Config, FixtureChain};

pub const ACCOUNT: &str = "0-mainnet";
pub const TON_WALLET: &str = "UQmywallet00000000000000000000000000000000000001";
pub const TRON_WALLET: &str = "TMywallet000000000000000000000001";
pub const COUNTERPARTY: &str = "UQfriend000000000000000000000000000000000000001";

/// Confirmed incoming transfer well above the tiny threshold
pub fn transfer(chain: Chain, slug: &str, id: &str, timestamp: i64) -> Activity {
    Activity::Transaction(TransactionActivity {
        id: id.to_string(),
        tx_id: id.to_string(),
        timestamp,
        status: ActivityStatus::Confirmed,
        chain,
        slug: slug.to_string(),
        from_address: COUNTERPARTY.to_string(),
        to_address: TON_WALLET.to_string(),
        normalized_address: COUNTERPARTY.to_string(),
        is_incoming: true,
        amount: 5_000_000_000,
        fee: 0,
        comment: None,
        encrypted_comment: None,
        external_msg_hash_norm: None,
        should_hide: false,
        is_scam: false,
        extra: TransactionExtra::default(),
    })
}

pub fn ton(id: &str, timestamp: i64) -> Activity {
    transfer(Chain::Ton, "toncoin", id, timestamp)
}

pub fn tron(id: &str, timestamp: i64) -> Activity {
    transfer(Chain::Tron, "trx", id, timestamp)
}

pub fn with_hash(mut activity: Activity, hash: &str) -> Activity {
    if let Activity::Transaction(tx) = &mut activity {
        tx.external_msg_hash_norm = Some(hash.to_string());
    }
    activity
}

pub fn account() -> Account {
    Account::new(ACCOUNT)
        .with_address(Chain::Ton, TON_WALLET)
        .with_address(Chain::Tron, TRON_WALLET)
}

pub fn config(batch: usize) -> Config {
    Config {
        activity_batch_size: batch,
        past_activity_delay: Duration::from_millis(200),
        initial_load_poll_interval: Duration::from_secs(1),
        initial_load_max_attempts: 60,
        ..Config::default()
    }
}

pub struct Harness {
    pub engine: ActivityEngine,
    pub ton: FixtureChain,
    pub tron: FixtureChain,
}

impl Harness {
    pub async fn new(config: Config) -> Self {
        let ton = FixtureChain::new(Chain::Ton);
        let tron = FixtureChain::new(Chain::Tron);
        Self::with_chains(config, ton, tron).await
    }

    pub async fn with_chains(config: Config, ton: FixtureChain, tron: FixtureChain) -> Self {
        let registry = ChainRegistry::new()
            .with(Arc::new(ton.clone()))
            .with(Arc::new(tron.clone()));
        let engine = ActivityEngine::new(config, registry).unwrap();
        engine.add_account(account()).await.unwrap();
        Self { engine, ton, tron }
    }

    pub async fn ids(&self, stream: &walletfeed_core::StreamKey) -> Vec<String> {
        self.engine
            .stream_activities(ACCOUNT, stream)
            .await
            .iter()
            .map(|a| a.id().to_string())
            .collect()
    }

    pub async fn timestamps(&self, stream: &walletfeed_core::StreamKey) -> Vec<i64> {
        self.engine
            .stream_activities(ACCOUNT, stream)
            .await
            .iter()
            .map(Activity::timestamp)
            .collect()
    }
}
