/// Local activity factory: optimistic records for transfers no backend has confirmed yet
use crate::account::Account;
use crate::activity::{
    build_local_tx_id, Activity, ActivityStatus, TransactionActivity, TransactionExtra, FAKE_TX_ID,
};
use crate::chain::ChainRegistry;
use crate::error::Result;
use crate::tokens::Chain;
use serde::{Deserialize, Serialize};

/// Minimal description of a submitted transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTransactionParams {
    /// Transaction id, or the normalized message hash on message-hash chains
    pub tx_id: String,
    pub to_address: String,
    /// Base units, as sent
    pub amount: u128,
    pub slug: String,
    #[serde(default)]
    pub fee: u128,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub encrypted_comment: Option<String>,
    #[serde(default)]
    pub normalized_address: Option<String>,
    #[serde(default)]
    pub external_msg_hash_norm: Option<String>,
    #[serde(default)]
    pub extra: TransactionExtra,
}

impl LocalTransactionParams {
    pub fn new(tx_id: impl Into<String>, to_address: impl Into<String>, amount: u128, slug: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            to_address: to_address.into(),
            amount,
            slug: slug.into(),
            fee: 0,
            from_address: None,
            comment: None,
            encrypted_comment: None,
            normalized_address: None,
            external_msg_hash_norm: None,
            extra: TransactionExtra::default(),
        }
    }
}

#[derive(Clone)]
pub struct LocalActivityFactory {
    chains: ChainRegistry,
}

impl LocalActivityFactory {
    pub fn new(chains: ChainRegistry) -> Self {
        Self { chains }
    }

    fn normalize(&self, account: &Account, chain: Chain, address: &str) -> Result<String> {
        Ok(match self.chains.find(chain) {
            Some(adapter) => adapter.normalize_address(address, account.network()?),
            None => address.to_string(),
        })
    }

    /// One `local` transaction per params entry, in order
    pub fn build_local_transactions(
        &self,
        account: &Account,
        chain: Chain,
        params: Vec<LocalTransactionParams>,
        now_ms: i64,
    ) -> Result<Vec<Activity>> {
        params
            .into_iter()
            .enumerate()
            .map(|(index, p)| {
                let normalized_address = match p.normalized_address {
                    Some(address) => address,
                    None => self.normalize(account, chain, &p.to_address)?,
                };
                let from_address = p
                    .from_address
                    .or_else(|| account.address(chain).map(str::to_string))
                    .unwrap_or_default();

                Ok(Activity::Transaction(TransactionActivity {
                    id: build_local_tx_id(&p.tx_id, index),
                    tx_id: p.tx_id,
                    timestamp: now_ms,
                    status: ActivityStatus::Local,
                    chain,
                    slug: p.slug,
                    from_address,
                    to_address: p.to_address,
                    normalized_address,
                    is_incoming: false,
                    amount: -(p.amount as i128),
                    fee: p.fee,
                    comment: p.comment,
                    encrypted_comment: p.encrypted_comment,
                    external_msg_hash_norm: p.external_msg_hash_norm,
                    should_hide: false,
                    is_scam: false,
                    extra: p.extra,
                }))
            })
            .collect()
    }

    /// Turn a pre-submission simulation into `pending` records sharing the message hash.
    /// Hidden items and placeholders are skipped without consuming a sequence number.
    pub fn convert_emulation(
        &self,
        account: &Account,
        chain: Chain,
        msg_hash_normalized: &str,
        emulated: Vec<Activity>,
        now_ms: i64,
    ) -> Result<Vec<Activity>> {
        let mut converted = Vec::new();
        for activity in emulated {
            if activity.should_hide() || activity.id() == FAKE_TX_ID {
                continue;
            }
            let local_id = build_local_tx_id(msg_hash_normalized, converted.len());
            let hash = Some(msg_hash_normalized.to_string());

            let local = match activity {
                Activity::Transaction(mut tx) => {
                    if tx.normalized_address.is_empty() {
                        tx.normalized_address = self.normalize(account, chain, &tx.to_address)?;
                    }
                    tx.id = local_id.clone();
                    tx.tx_id = local_id;
                    tx.timestamp = now_ms;
                    tx.external_msg_hash_norm = hash;
                    tx.status = ActivityStatus::Pending;
                    Activity::Transaction(tx)
                }
                Activity::Swap(mut swap) => {
                    swap.id = local_id;
                    swap.timestamp = now_ms;
                    swap.external_msg_hash_norm = hash;
                    swap.status = ActivityStatus::Pending;
                    Activity::Swap(swap)
                }
            };
            converted.push(local);
        }
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::fixtures::tx;
    use crate::activity::SwapActivity;
    use crate::chain::FixtureChain;
    use std::sync::Arc;

    fn factory() -> LocalActivityFactory {
        LocalActivityFactory::new(ChainRegistry::new().with(Arc::new(FixtureChain::new(Chain::Ton))))
    }

    fn account() -> Account {
        Account::new("0-mainnet").with_address(Chain::Ton, "UQmywallet")
    }

    #[test]
    fn test_local_transactions_from_params() {
        let mut second = LocalTransactionParams::new("tx1", "EQdest2", 7, "toncoin");
        second.normalized_address = Some("precomputed".to_string());
        let params = vec![LocalTransactionParams::new("tx1", "EQdest1", 5, "toncoin"), second];

        let built = factory()
            .build_local_transactions(&account(), Chain::Ton, params, 1_000)
            .unwrap();

        assert_eq!(built.len(), 2);
        let first = built[0].as_transaction().unwrap();
        assert_eq!(first.id, "tx1:0|local");
        assert_eq!(first.status, ActivityStatus::Local);
        assert_eq!(first.amount, -5);
        assert_eq!(first.normalized_address, "UQdest1");
        assert_eq!(first.from_address, "UQmywallet");
        assert_eq!(built[1].id(), "tx1:1|local");
        assert_eq!(built[1].as_transaction().unwrap().normalized_address, "precomputed");
    }

    #[test]
    fn test_emulation_skips_hidden_without_consuming_sequence() {
        let mut hidden = tx("emu-b", 2);
        if let Activity::Transaction(t) = &mut hidden {
            t.should_hide = true;
        }
        let mut no_address = tx("emu-a", 1);
        if let Activity::Transaction(t) = &mut no_address {
            t.normalized_address = String::new();
            t.to_address = "EQtarget".to_string();
        }
        let swap = Activity::Swap(SwapActivity {
            id: "emu-c".to_string(),
            timestamp: 3,
            status: ActivityStatus::Confirmed,
            chain: Chain::Ton,
            from_slug: "toncoin".to_string(),
            to_slug: "ton-eqcxe6mutq".to_string(),
            from_amount: "1".to_string(),
            to_amount: "3.2".to_string(),
            network_fee: "0.05".to_string(),
            swap_fee: "0.01".to_string(),
            hashes: Vec::new(),
            external_msg_hash_norm: None,
            should_hide: false,
        });
        let placeholder = tx(FAKE_TX_ID, 4);

        let converted = factory()
            .convert_emulation(&account(), Chain::Ton, "h", vec![no_address, hidden, swap, placeholder], 9_000)
            .unwrap();

        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].id(), "h:0|local");
        assert_eq!(converted[1].id(), "h:1|local");
        assert!(converted.iter().all(|a| a.timestamp() == 9_000));
        assert!(converted.iter().all(|a| a.status() == ActivityStatus::Pending));
        assert!(converted.iter().all(|a| a.external_msg_hash_norm() == Some("h")));
        assert_eq!(converted[0].as_transaction().unwrap().normalized_address, "UQtarget");
    }
}
