/// Activity persistence: windows and activities stored in sled DB
///
/// Layout:
/// - `activities`: `"{account}:{id}"` -> activity JSON
/// - `windows`: `"{account} {stream}"` -> `{ids, is_history_end_reached}`
/// - `accounts`: `"{account}"` -> `{is_initial_loaded}`
use crate::activity::Activity;
use crate::error::{Result, WalletError};
use crate::state::{AccountActivities, ActivityWindow, StreamKey};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct AccountMeta {
    is_initial_loaded: bool,
}

#[derive(Clone)]
pub struct ActivityStore {
    db: sled::Db,
    activities: sled::Tree,
    windows: sled::Tree,
    accounts: sled::Tree,
}

impl ActivityStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("activities.db");
        let db = sled::open(&db_path)
            .map_err(|e| WalletError::Storage(format!("Failed to open activities DB: {}", e)))?;

        Ok(Self {
            activities: db.open_tree("activities")?,
            windows: db.open_tree("windows")?,
            accounts: db.open_tree("accounts")?,
            db,
        })
    }

    fn activity_prefix(account_id: &str) -> String {
        format!("{}:", account_id)
    }

    fn window_prefix(account_id: &str) -> String {
        format!("{} ", account_id)
    }

    /// Replace everything stored for the account with `activities`
    pub fn save_account(&self, account_id: &str, activities: &AccountActivities) -> Result<()> {
        let mut batch = sled::Batch::default();
        for key in self.activities.scan_prefix(Self::activity_prefix(account_id)).keys() {
            batch.remove(key?);
        }
        for (id, activity) in &activities.by_id {
            let key = format!("{}{}", Self::activity_prefix(account_id), id);
            batch.insert(key.as_bytes(), serde_json::to_vec(activity)?);
        }
        self.activities
            .apply_batch(batch)
            .map_err(|e| WalletError::Storage(format!("Failed to save activities: {}", e)))?;

        let mut batch = sled::Batch::default();
        for key in self.windows.scan_prefix(Self::window_prefix(account_id)).keys() {
            batch.remove(key?);
        }
        for (stream, window) in &activities.windows {
            let key = format!("{}{}", Self::window_prefix(account_id), stream);
            batch.insert(key.as_bytes(), serde_json::to_vec(window)?);
        }
        self.windows
            .apply_batch(batch)
            .map_err(|e| WalletError::Storage(format!("Failed to save windows: {}", e)))?;

        let meta = AccountMeta {
            is_initial_loaded: activities.is_initial_loaded,
        };
        self.accounts
            .insert(account_id.as_bytes(), serde_json::to_vec(&meta)?)?;
        Ok(())
    }

    /// Stored state of an account, `None` if nothing was ever saved
    pub fn load_account(&self, account_id: &str) -> Result<Option<AccountActivities>> {
        let Some(raw_meta) = self.accounts.get(account_id.as_bytes())? else {
            return Ok(None);
        };
        let meta: AccountMeta = serde_json::from_slice(&raw_meta)?;

        let mut restored = AccountActivities {
            is_initial_loaded: meta.is_initial_loaded,
            ..Default::default()
        };

        for entry in self.activities.scan_prefix(Self::activity_prefix(account_id)) {
            let (_, value) = entry?;
            let activity: Activity = serde_json::from_slice(&value)?;
            restored.by_id.insert(activity.id().to_string(), activity);
        }

        let prefix = Self::window_prefix(account_id);
        for entry in self.windows.scan_prefix(&prefix) {
            let (key, value) = entry?;
            let key = String::from_utf8_lossy(&key);
            let stream = StreamKey::from(key[prefix.len()..].to_string());
            let mut window: ActivityWindow = serde_json::from_slice(&value)?;
            window.ids.retain(|id| restored.by_id.contains_key(id));
            restored.windows.insert(stream, window);
        }

        Ok(Some(restored))
    }

    pub fn remove_account(&self, account_id: &str) -> Result<()> {
        for key in self.activities.scan_prefix(Self::activity_prefix(account_id)).keys() {
            self.activities.remove(key?)?;
        }
        for key in self.windows.scan_prefix(Self::window_prefix(account_id)).keys() {
            self.windows.remove(key?)?;
        }
        self.accounts.remove(account_id.as_bytes())?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| WalletError::Storage(format!("Failed to flush activities DB: {}", e)))?;
        Ok(())
    }

    /// Number of stored activities across all accounts
    pub fn count(&self) -> usize {
        self.activities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::activity::fixtures::tx;
    use crate::reducers;
    use crate::state::WalletState;
    use tempfile::TempDir;

    fn loaded_account() -> AccountActivities {
        let state = reducers::add_account(WalletState::default(), Account::new("0-mainnet"), None);
        let state = reducers::initial_activities(state, "0-mainnet", vec![tx("a", 20), tx("b", 10)], false);
        let state = reducers::add_past_activities(
            state,
            "0-mainnet",
            &StreamKey::Token("toncoin".into()),
            vec![tx("b", 10)],
            true,
        );
        state.account_activities("0-mainnet").cloned().unwrap()
    }

    #[test]
    fn test_save_and_restore_account() {
        let dir = TempDir::new().unwrap();
        let store = ActivityStore::new(dir.path()).unwrap();
        assert!(store.load_account("0-mainnet").unwrap().is_none());

        store.save_account("0-mainnet", &loaded_account()).unwrap();
        let restored = store.load_account("0-mainnet").unwrap().unwrap();

        assert!(restored.is_initial_loaded);
        assert_eq!(restored.by_id.len(), 2);
        assert_eq!(restored.window(&StreamKey::All).unwrap().ids, vec!["a", "b"]);
        assert!(restored.is_history_end_reached(&StreamKey::Token("toncoin".into())));
    }

    #[test]
    fn test_save_replaces_superseded_entries() {
        let dir = TempDir::new().unwrap();
        let store = ActivityStore::new(dir.path()).unwrap();
        store.save_account("0-mainnet", &loaded_account()).unwrap();

        let mut smaller = loaded_account();
        smaller.by_id.remove("a");
        smaller.windows.remove(&StreamKey::Token("toncoin".into()));
        store.save_account("0-mainnet", &smaller).unwrap();

        let restored = store.load_account("0-mainnet").unwrap().unwrap();
        assert_eq!(restored.by_id.len(), 1);
        assert_eq!(restored.window(&StreamKey::All).unwrap().ids, vec!["b"]);
        assert!(restored.window(&StreamKey::Token("toncoin".into())).is_none());
    }

    #[test]
    fn test_remove_account_keeps_others() {
        let dir = TempDir::new().unwrap();
        let store = ActivityStore::new(dir.path()).unwrap();
        store.save_account("0-mainnet", &loaded_account()).unwrap();
        store.save_account("1-mainnet", &loaded_account()).unwrap();

        store.remove_account("0-mainnet").unwrap();

        assert!(store.load_account("0-mainnet").unwrap().is_none());
        assert!(store.load_account("1-mainnet").unwrap().is_some());
        assert_eq!(store.count(), 2);
    }
}
