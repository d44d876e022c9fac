/// Activity windows survive an engine restart when a data dir is configured
extern crate walletfeed_core;

mod common;

use common::*;
use tempfile::TempDir;
use walletfeed_core::chain::FixtureChain;
use walletfeed_core::local::LocalTransactionParams;
use walletfeed_core::{Chain, StreamKey};

#[tokio::test]
async fn test_windows_restored_after_restart() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(2);
    cfg.data_dir = Some(dir.path().to_path_buf());

    let ton_chain = FixtureChain::new(Chain::Ton);
    ton_chain
        .push(ACCOUNT, (1..=3).map(|i| ton(&format!("ton-{}", i), i * 10)))
        .await;

    {
        let h = Harness::with_chains(cfg.clone(), ton_chain.clone(), FixtureChain::new(Chain::Tron)).await;
        h.engine.load_initial_activities(ACCOUNT).await.unwrap();
        h.engine.sync_stream(ACCOUNT, &StreamKey::All).await.unwrap();
        h.engine.sync_stream(ACCOUNT, &StreamKey::All).await.unwrap();
        h.engine
            .create_local_transactions(
                ACCOUNT,
                Chain::Ton,
                vec![LocalTransactionParams::new("h", COUNTERPARTY, 1, "toncoin")],
            )
            .await
            .unwrap();
        h.engine.flush().unwrap();
    }

    let h = Harness::with_chains(cfg, ton_chain.clone(), FixtureChain::new(Chain::Tron)).await;
    let calls = ton_chain.fetch_calls();

    let state = h.engine.store().snapshot().await;
    let restored = state.account_activities(ACCOUNT).unwrap();
    assert!(restored.is_initial_loaded);
    assert!(restored.is_history_end_reached(&StreamKey::All));
    assert_eq!(h.ids(&StreamKey::All).await, vec!["h:0|local", "ton-3", "ton-2", "ton-1"]);

    // History end was persisted, so nothing is fetched again
    h.engine.sync_stream(ACCOUNT, &StreamKey::All).await.unwrap();
    assert_eq!(ton_chain.fetch_calls(), calls);
}

#[tokio::test]
async fn test_removed_account_is_forgotten() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(5);
    cfg.data_dir = Some(dir.path().to_path_buf());

    let ton_chain = FixtureChain::new(Chain::Ton);
    ton_chain.push(ACCOUNT, vec![ton("ton-1", 10)]).await;

    {
        let h = Harness::with_chains(cfg.clone(), ton_chain.clone(), FixtureChain::new(Chain::Tron)).await;
        h.engine.load_initial_activities(ACCOUNT).await.unwrap();
        h.engine.remove_account(ACCOUNT).await.unwrap();
        h.engine.flush().unwrap();
    }

    let h = Harness::with_chains(cfg, ton_chain, FixtureChain::new(Chain::Tron)).await;
    let state = h.engine.store().snapshot().await;
    assert!(!state.account_activities(ACCOUNT).unwrap().is_initial_loaded);
    assert!(h.ids(&StreamKey::All).await.is_empty());
}
