/// Wallet state: accounts, activity windows, settings
///
/// The state is a plain value. Every mutation goes through [`Store::update`],
/// which applies one reducer at a time under the write lock and bumps the
/// version, so handlers never observe a half-applied change.
use crate::account::Account;
use crate::activity::{is_local_id, Activity};
use crate::filter::Settings;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Which activity history a window holds
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StreamKey {
    /// Every chain and token of the account
    All,
    /// One token slug
    Token(String),
}

impl StreamKey {
    pub fn from_slug(slug: Option<&str>) -> Self {
        match slug {
            Some(slug) => StreamKey::Token(slug.to_string()),
            None => StreamKey::All,
        }
    }

    pub fn slug(&self) -> Option<&str> {
        match self {
            StreamKey::All => None,
            StreamKey::Token(slug) => Some(slug),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKey::All => f.write_str("all"),
            StreamKey::Token(slug) => f.write_str(slug),
        }
    }
}

impl From<String> for StreamKey {
    fn from(s: String) -> Self {
        if s == "all" {
            StreamKey::All
        } else {
            StreamKey::Token(s)
        }
    }
}

impl From<StreamKey> for String {
    fn from(key: StreamKey) -> Self {
        key.to_string()
    }
}

/// Ordered history of one stream, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityWindow {
    pub ids: Vec<String>,
    pub is_history_end_reached: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountActivities {
    pub by_id: HashMap<String, Activity>,
    pub windows: BTreeMap<StreamKey, ActivityWindow>,
    /// Set once the first page of the `All` stream has landed
    pub is_initial_loaded: bool,
}

impl AccountActivities {
    pub fn window(&self, stream: &StreamKey) -> Option<&ActivityWindow> {
        self.windows.get(stream)
    }

    pub fn is_history_end_reached(&self, stream: &StreamKey) -> bool {
        self.window(stream)
            .map(|w| w.is_history_end_reached)
            .unwrap_or(false)
    }

    /// Pagination cursor: timestamp of the oldest backend-confirmed entry.
    /// Local records are excluded since no backend has vouched for them.
    pub fn last_activity_timestamp(&self, stream: &StreamKey) -> Option<i64> {
        let window = self.window(stream)?;
        window
            .ids
            .iter()
            .rev()
            .filter(|id| !is_local_id(id))
            .find_map(|id| self.by_id.get(id))
            .map(Activity::timestamp)
    }

    /// Timestamp of the newest backend activity in a stream
    pub fn newest_activity_timestamp(&self, stream: &StreamKey) -> Option<i64> {
        let window = self.window(stream)?;
        window
            .ids
            .iter()
            .filter(|id| !is_local_id(id))
            .find_map(|id| self.by_id.get(id))
            .map(Activity::timestamp)
    }

    /// Activities of a stream in window order
    pub fn activities(&self, stream: &StreamKey) -> Vec<&Activity> {
        self.window(stream)
            .map(|w| w.ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub account: Account,
    pub activities: AccountActivities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletState {
    /// Incremented by every applied reducer
    pub version: u64,
    pub settings: Settings,
    pub accounts: BTreeMap<String, AccountState>,
}

impl WalletState {
    pub fn account(&self, account_id: &str) -> Option<&AccountState> {
        self.accounts.get(account_id)
    }

    pub fn account_activities(&self, account_id: &str) -> Option<&AccountActivities> {
        self.account(account_id).map(|a| &a.activities)
    }

    /// The condition the initial-load gate waits for
    pub fn is_initial_load_settled(&self, account_id: &str) -> bool {
        match self.account(account_id) {
            None => true,
            Some(state) => state.activities.is_initial_loaded,
        }
    }
}

/// Shared handle to the wallet state
#[derive(Clone)]
pub struct Store {
    state: Arc<RwLock<WalletState>>,
    version: Arc<watch::Sender<u64>>,
}

impl Store {
    pub fn new(state: WalletState) -> Self {
        let (version, _) = watch::channel(state.version);
        Self {
            state: Arc::new(RwLock::new(state)),
            version: Arc::new(version),
        }
    }

    /// Read a projection of the current state
    pub async fn read<R>(&self, f: impl FnOnce(&WalletState) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    pub async fn snapshot(&self) -> WalletState {
        self.state.read().await.clone()
    }

    /// Apply one reducer; returns the new version
    pub async fn update(&self, reducer: impl FnOnce(WalletState) -> WalletState) -> u64 {
        let mut guard = self.state.write().await;
        let current = std::mem::take(&mut *guard);
        let mut next = reducer(current);
        next.version += 1;
        let version = next.version;
        *guard = next;
        drop(guard);
        self.version.send_replace(version);
        version
    }

    /// Receiver that observes every version bump
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(WalletState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_key_string_form() {
        assert_eq!(StreamKey::All.to_string(), "all");
        assert_eq!(StreamKey::from("trx".to_string()), StreamKey::Token("trx".into()));
        assert_eq!(StreamKey::from_slug(None), StreamKey::All);
        let json = serde_json::to_string(&StreamKey::Token("toncoin".into())).unwrap();
        assert_eq!(json, "\"toncoin\"");
    }

    #[tokio::test]
    async fn test_store_update_bumps_version() {
        let store = Store::default();
        let mut rx = store.subscribe();

        let version = store
            .update(|mut state| {
                state.settings.are_tiny_transfers_hidden = false;
                state
            })
            .await;

        assert_eq!(version, 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
        assert!(!store.read(|s| s.settings.are_tiny_transfers_hidden).await);
    }
}
