/// Initial-load gate
///
/// Paging older history is meaningless before an account's first `All` page
/// has landed, so sync waits here. Concurrent waiters for one account share a
/// single poll. The gate also opens when the account has been removed, and
/// gives up after a bounded number of poll intervals.
use crate::state::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct InitialLoadGate {
    store: Store,
    poll_interval: Duration,
    max_attempts: u32,
    waits: Arc<Mutex<HashMap<String, watch::Receiver<Option<bool>>>>>,
}

impl InitialLoadGate {
    pub fn new(store: Store, poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            store,
            poll_interval,
            max_attempts,
            waits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// True once the account is loaded or gone; false if the wait timed out
    pub async fn wait(&self, account_id: &str) -> bool {
        let mut outcome = {
            let mut waits = self.waits.lock().await;
            match waits.get(account_id) {
                Some(existing) => existing.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    waits.insert(account_id.to_string(), rx.clone());

                    let gate = self.clone();
                    let account_id = account_id.to_string();
                    tokio::spawn(async move {
                        let settled = gate.poll(&account_id).await;
                        tx.send_replace(Some(settled));
                        gate.waits.lock().await.remove(&account_id);
                    });
                    rx
                }
            }
        };

        let settled = match outcome.wait_for(Option::is_some).await {
            Ok(settled) => settled.unwrap_or(false),
            Err(_) => false,
        };
        settled
    }

    async fn poll(&self, account_id: &str) -> bool {
        if self.is_settled(account_id).await {
            return true;
        }
        debug!("Waiting for initial activities of {}", account_id);

        let mut changes = self.store.subscribe();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut attempts = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => attempts += 1,
                changed = changes.changed() => {
                    if changed.is_err() {
                        ticker.tick().await;
                        attempts += 1;
                    }
                }
            }

            if self.is_settled(account_id).await {
                return true;
            }
            if attempts >= self.max_attempts {
                warn!(
                    "Initial activities of {} did not load after {} attempts",
                    account_id, attempts
                );
                return false;
            }
        }
    }

    async fn is_settled(&self, account_id: &str) -> bool {
        self.store
            .read(|state| state.is_initial_load_settled(account_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::reducers;

    async fn store_with_account() -> Store {
        let store = Store::default();
        store
            .update(|s| reducers::add_account(s, Account::new("0-mainnet"), None))
            .await;
        store
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_opens_when_initial_page_lands() {
        let store = store_with_account().await;
        let gate = InitialLoadGate::new(store.clone(), Duration::from_secs(1), 60);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait("0-mainnet").await })
        };
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!waiter.is_finished());

        store
            .update(|s| reducers::initial_activities(s, "0-mainnet", vec![], false))
            .await;
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_opens_for_removed_account() {
        let store = store_with_account().await;
        let gate = InitialLoadGate::new(store.clone(), Duration::from_secs(1), 60);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait("0-mainnet").await })
        };
        tokio::time::sleep(Duration::from_millis(1500)).await;
        store.update(|s| reducers::remove_account(s, "0-mainnet")).await;

        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_times_out() {
        let store = store_with_account().await;
        let gate = InitialLoadGate::new(store, Duration::from_secs(1), 3);

        let started = tokio::time::Instant::now();
        assert!(!gate.wait("0-mainnet").await);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_share_one_poll() {
        let store = store_with_account().await;
        let gate = InitialLoadGate::new(store.clone(), Duration::from_secs(1), 60);

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait("0-mainnet").await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gate.waits.lock().await.len(), 1);

        store
            .update(|s| reducers::initial_activities(s, "0-mainnet", vec![], true))
            .await;
        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
    }
}
