/// Activity model: the ledger events shown in a wallet's history
use crate::tokens::Chain;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Suffix that marks ids synthesized on the client
pub const LOCAL_ID_SUFFIX: &str = "|local";

/// Placeholder id some emulation backends emit for non-materialized actions
pub const FAKE_TX_ID: &str = "fakeTxId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    /// Synthesized on submission, not seen by any backend yet
    Local,
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionExtra {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub with_w5_gasless: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionActivity {
    pub id: String,
    pub tx_id: String,
    pub timestamp: i64,
    pub status: ActivityStatus,
    pub chain: Chain,
    pub slug: String,
    pub from_address: String,
    pub to_address: String,
    pub normalized_address: String,
    pub is_incoming: bool,
    /// Base units, negative for outgoing transfers
    #[serde(with = "amount_str")]
    pub amount: i128,
    #[serde(with = "amount_str")]
    pub fee: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_msg_hash_norm: Option<String>,
    #[serde(default)]
    pub should_hide: bool,
    #[serde(default)]
    pub is_scam: bool,
    #[serde(default)]
    pub extra: TransactionExtra,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapActivity {
    pub id: String,
    pub timestamp: i64,
    pub status: ActivityStatus,
    pub chain: Chain,
    pub from_slug: String,
    pub to_slug: String,
    /// Decimal strings as reported by the swap backend
    pub from_amount: String,
    pub to_amount: String,
    pub network_fee: String,
    pub swap_fee: String,
    #[serde(default)]
    pub hashes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_msg_hash_norm: Option<String>,
    #[serde(default)]
    pub should_hide: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Activity {
    Transaction(TransactionActivity),
    Swap(SwapActivity),
}

impl Activity {
    pub fn id(&self) -> &str {
        match self {
            Activity::Transaction(tx) => &tx.id,
            Activity::Swap(swap) => &swap.id,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Activity::Transaction(tx) => tx.timestamp,
            Activity::Swap(swap) => swap.timestamp,
        }
    }

    pub fn status(&self) -> ActivityStatus {
        match self {
            Activity::Transaction(tx) => tx.status,
            Activity::Swap(swap) => swap.status,
        }
    }

    pub fn chain(&self) -> Chain {
        match self {
            Activity::Transaction(tx) => tx.chain,
            Activity::Swap(swap) => swap.chain,
        }
    }

    pub fn should_hide(&self) -> bool {
        match self {
            Activity::Transaction(tx) => tx.should_hide,
            Activity::Swap(swap) => swap.should_hide,
        }
    }

    pub fn external_msg_hash_norm(&self) -> Option<&str> {
        match self {
            Activity::Transaction(tx) => tx.external_msg_hash_norm.as_deref(),
            Activity::Swap(swap) => swap.external_msg_hash_norm.as_deref(),
        }
    }

    /// Key that identifies one logical transaction across local and confirmed records.
    /// Chains without message hashes (TRON) join on the transaction id.
    pub fn join_key(&self) -> &str {
        match (self.external_msg_hash_norm(), self) {
            (Some(hash), _) => hash,
            (None, Activity::Transaction(tx)) if !tx.tx_id.is_empty() => &tx.tx_id,
            (None, _) => self.id(),
        }
    }

    /// Token slugs whose per-token streams include this activity
    pub fn slugs(&self) -> Vec<&str> {
        match self {
            Activity::Transaction(tx) => vec![tx.slug.as_str()],
            Activity::Swap(swap) if swap.from_slug == swap.to_slug => vec![swap.from_slug.as_str()],
            Activity::Swap(swap) => vec![swap.from_slug.as_str(), swap.to_slug.as_str()],
        }
    }

    pub fn is_local(&self) -> bool {
        is_local_id(self.id())
    }

    pub fn as_transaction(&self) -> Option<&TransactionActivity> {
        match self {
            Activity::Transaction(tx) => Some(tx),
            Activity::Swap(_) => None,
        }
    }
}

/// Big integers travel as decimal strings; tagged enums cannot buffer 128-bit numbers
mod amount_str {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Deterministic id for a client-synthesized record
pub fn build_local_tx_id(hash: &str, index: usize) -> String {
    format!("{}:{}{}", hash, index, LOCAL_ID_SUFFIX)
}

pub fn is_local_id(id: &str) -> bool {
    id.ends_with(LOCAL_ID_SUFFIX)
}

/// Newest first; equal timestamps fall back to id so the order is total
pub fn compare_activities(a: &Activity, b: &Activity) -> Ordering {
    b.timestamp()
        .cmp(&a.timestamp())
        .then_with(|| b.id().cmp(a.id()))
}

pub fn sort_activities(activities: &mut [Activity]) {
    activities.sort_by(compare_activities);
}
