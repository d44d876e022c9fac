/// Spam/visibility filter and scam heuristics
///
/// Visibility is only ever used to decide whether pagination should keep
/// fetching and what a feed renders; hidden activities are still stored.
use crate::account::Account;
use crate::activity::{Activity, TransactionActivity};
use crate::tokens::{build_token_slug, Chain, TONCOIN_SLUG, TRX_SLUG};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

const HOUR_MS: i64 = 60 * 60 * 1000;
const POISONING_KEY_EDGE: usize = 4;
const SCAM_DOMAIN_MIN_LABEL: usize = 26;
const TRC20_USDT_MAINNET_ADDRESS: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

/// User settings the filter reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Hide incoming transfers below the slug's threshold and source-flagged scam
    pub are_tiny_transfers_hidden: bool,

    /// Per-slug tiny transfer threshold in base units
    pub tiny_transfer_thresholds: BTreeMap<String, u128>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut tiny_transfer_thresholds = BTreeMap::new();
        tiny_transfer_thresholds.insert(TONCOIN_SLUG.to_string(), 10_000_000);
        tiny_transfer_thresholds.insert(TRX_SLUG.to_string(), 10_000);
        tiny_transfer_thresholds.insert(
            build_token_slug(Chain::Tron, TRC20_USDT_MAINNET_ADDRESS),
            10_000,
        );
        Self {
            are_tiny_transfers_hidden: true,
            tiny_transfer_thresholds,
        }
    }
}

#[derive(Debug, Clone)]
struct SeenAddress {
    address: String,
    timestamp: i64,
    amount: u128,
}

/// Remembers, per account, the first address seen for each lookalike key
/// (same prefix and suffix). Later lookalikes of a known address are
/// address-poisoning attempts.
#[derive(Clone, Default)]
pub struct PoisoningCache {
    seen: Arc<RwLock<HashMap<String, HashMap<String, SeenAddress>>>>,
}

impl PoisoningCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(address: &str) -> Option<String> {
        let chars: Vec<char> = address.chars().collect();
        if chars.len() <= POISONING_KEY_EDGE * 2 {
            return None;
        }
        let head: String = chars[..POISONING_KEY_EDGE].iter().collect();
        let tail: String = chars[chars.len() - POISONING_KEY_EDGE..].iter().collect();
        Some(format!("{}...{}", head, tail))
    }

    /// Feed a fetched transaction into the cache
    pub fn update(&self, account_id: &str, tx: &TransactionActivity) {
        let Some(key) = Self::key(&tx.normalized_address) else {
            return;
        };
        let amount = tx.amount.unsigned_abs();
        let mut accounts = self.seen.write().unwrap_or_else(|e| e.into_inner());
        let seen = accounts.entry(account_id.to_string()).or_default();
        let replace = match seen.get(&key) {
            None => true,
            Some(cached) => {
                cached.timestamp > tx.timestamp
                    || (cached.timestamp == tx.timestamp && cached.amount < amount)
            }
        };
        if replace {
            seen.insert(
                key,
                SeenAddress {
                    address: tx.normalized_address.clone(),
                    timestamp: tx.timestamp,
                    amount,
                },
            );
        }
    }

    pub fn is_poisoning(&self, account_id: &str, tx: &TransactionActivity) -> bool {
        let Some(key) = Self::key(&tx.normalized_address) else {
            return false;
        };
        let accounts = self.seen.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(account_id)
            .and_then(|seen| seen.get(&key))
            .map(|cached| cached.address != tx.normalized_address)
            .unwrap_or(false)
    }

    pub fn forget(&self, account_id: &str) {
        self.seen
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(account_id);
    }
}

/// The visibility predicate
#[derive(Clone, Default)]
pub struct VisibilityFilter {
    poisoning: PoisoningCache,
}

impl VisibilityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poisoning(&self) -> &PoisoningCache {
        &self.poisoning
    }

    /// Record fetched activities so later lookalikes can be recognized
    pub fn observe(&self, account_id: &str, activities: &[Activity]) {
        for activity in activities {
            if let Activity::Transaction(tx) = activity {
                self.poisoning.update(account_id, tx);
            }
        }
    }

    pub fn is_hidden(&self, account_id: &str, activity: &Activity, settings: &Settings) -> bool {
        if activity.should_hide() {
            return true;
        }
        match activity {
            Activity::Transaction(tx) => {
                self.poisoning.is_poisoning(account_id, tx)
                    || (settings.are_tiny_transfers_hidden && is_tiny_or_scam_transaction(tx, settings))
            }
            Activity::Swap(_) => false,
        }
    }

    pub fn count_visible(&self, account_id: &str, activities: &[Activity], settings: &Settings) -> usize {
        activities
            .iter()
            .filter(|activity| !self.is_hidden(account_id, activity, settings))
            .count()
    }
}

pub fn is_tiny_or_scam_transaction(tx: &TransactionActivity, settings: &Settings) -> bool {
    if tx.is_scam {
        return true;
    }
    if !tx.is_incoming {
        return false;
    }
    settings
        .tiny_transfer_thresholds
        .get(&tx.slug)
        .map(|threshold| tx.amount.unsigned_abs() < *threshold)
        .unwrap_or(false)
}

/// Addresses like `<26+ word chars>.<tld>` imitate real wallets in domain form
pub fn should_show_domain_scam_warning(address: &str) -> bool {
    let label_len = address
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .count();
    label_len >= SCAM_DOMAIN_MIN_LABEL && address[label_len..].starts_with('.')
}

/// Token holding summary used by the seed-phrase warning
#[derive(Debug, Clone)]
pub struct TokenBalance {
    pub slug: String,
    pub chain: Chain,
    pub amount: u128,
}

/// Freshly imported accounts holding TRON tokens are a common target of
/// "shared seed phrase" scams: warn before sending them out.
pub fn should_show_seed_phrase_scam_warning(
    account: &Account,
    tokens: &[TokenBalance],
    transfer_chain: Chain,
) -> bool {
    seed_phrase_warning_at(account, tokens, transfer_chain, chrono::Utc::now().timestamp_millis())
}

fn seed_phrase_warning_at(
    account: &Account,
    tokens: &[TokenBalance],
    transfer_chain: Chain,
    now_ms: i64,
) -> bool {
    let Some(imported_at) = account.imported_at else {
        return false;
    };
    if now_ms - imported_at > HOUR_MS || transfer_chain != Chain::Tron {
        return false;
    }
    let usdt_slug = build_token_slug(Chain::Tron, TRC20_USDT_MAINNET_ADDRESS);
    tokens.iter().any(|token| {
        token.slug == usdt_slug
            || (token.chain == Chain::Tron && token.amount > 0 && token.slug != TRX_SLUG)
    })
}
