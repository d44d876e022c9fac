/// Pure state transitions over [`WalletState`]
///
/// Every merge is a set union followed by a sort, so applying the same page
/// twice or applying pages out of order converges to the same window.
use crate::account::Account;
use crate::activity::{compare_activities, Activity};
use crate::filter::Settings;
use crate::state::{AccountActivities, AccountState, StreamKey, WalletState};
use std::collections::HashSet;

pub fn add_account(
    mut state: WalletState,
    account: Account,
    restored: Option<AccountActivities>,
) -> WalletState {
    let activities = restored.unwrap_or_default();
    state.accounts.insert(
        account.id.clone(),
        AccountState {
            account,
            activities,
        },
    );
    state
}

pub fn remove_account(mut state: WalletState, account_id: &str) -> WalletState {
    state.accounts.remove(account_id);
    state
}

pub fn update_settings(mut state: WalletState, settings: Settings) -> WalletState {
    state.settings = settings;
    state
}

/// First page of the `All` stream; opens the initial-load gate
pub fn initial_activities(
    mut state: WalletState,
    account_id: &str,
    activities: Vec<Activity>,
    is_history_end_reached: bool,
) -> WalletState {
    if let Some(account) = state.accounts.get_mut(account_id) {
        let target = &mut account.activities;
        merge_into_window(target, &StreamKey::All, &activities, is_history_end_reached);
        supersede_local(target, &activities);
        target.is_initial_loaded = true;
    }
    state
}

/// Older history fetched by the pagination controller
pub fn add_past_activities(
    mut state: WalletState,
    account_id: &str,
    stream: &StreamKey,
    activities: Vec<Activity>,
    is_history_end_reached: bool,
) -> WalletState {
    if let Some(account) = state.accounts.get_mut(account_id) {
        let target = &mut account.activities;
        merge_into_window(target, stream, &activities, is_history_end_reached);
        supersede_local(target, &activities);
    }
    state
}

/// Newest activities seen by the background watcher. They land in the `All`
/// window and in every already-loaded token window they belong to.
pub fn add_new_activities(
    mut state: WalletState,
    account_id: &str,
    activities: Vec<Activity>,
) -> WalletState {
    if let Some(account) = state.accounts.get_mut(account_id) {
        let target = &mut account.activities;
        merge_into_window(target, &StreamKey::All, &activities, false);
        for stream in loaded_token_streams(target) {
            let matching = activities_for_stream(&activities, &stream);
            if !matching.is_empty() {
                merge_into_window(target, &stream, &matching, false);
            }
        }
        supersede_local(target, &activities);
    }
    state
}

/// Optimistic records from the local activity factory.
/// A record whose confirmed counterpart is already known is dropped.
pub fn add_local_activities(
    mut state: WalletState,
    account_id: &str,
    activities: Vec<Activity>,
) -> WalletState {
    if let Some(account) = state.accounts.get_mut(account_id) {
        let target = &mut account.activities;
        let confirmed = confirmed_join_keys(target);
        let fresh: Vec<Activity> = activities
            .into_iter()
            .filter(|a| !confirmed.contains(a.join_key()))
            .collect();
        if fresh.is_empty() {
            return state;
        }

        merge_into_window(target, &StreamKey::All, &fresh, false);
        let slugs: HashSet<String> = fresh
            .iter()
            .flat_map(|a| a.slugs())
            .map(str::to_string)
            .collect();
        for slug in slugs {
            let stream = StreamKey::Token(slug);
            let matching = activities_for_stream(&fresh, &stream);
            merge_into_window(target, &stream, &matching, false);
        }
    }
    state
}

/// Drop a window so the stream re-syncs from scratch. The only way to clear
/// a reached history end.
pub fn reset_stream(mut state: WalletState, account_id: &str, stream: &StreamKey) -> WalletState {
    if let Some(account) = state.accounts.get_mut(account_id) {
        let target = &mut account.activities;
        target.windows.remove(stream);
        if *stream == StreamKey::All {
            target.is_initial_loaded = false;
        }
        prune_unreferenced(target);
    }
    state
}

fn merge_into_window(
    target: &mut AccountActivities,
    stream: &StreamKey,
    incoming: &[Activity],
    is_history_end_reached: bool,
) {
    for activity in incoming {
        target
            .by_id
            .insert(activity.id().to_string(), activity.clone());
    }

    let window = target.windows.entry(stream.clone()).or_default();
    let mut ids: HashSet<String> = window.ids.drain(..).collect();
    ids.extend(incoming.iter().map(|a| a.id().to_string()));

    let mut ordered: Vec<&Activity> = ids.iter().filter_map(|id| target.by_id.get(id)).collect();
    ordered.sort_by(|a, b| compare_activities(a, b));
    window.ids = ordered.into_iter().map(|a| a.id().to_string()).collect();
    window.is_history_end_reached |= is_history_end_reached;
}

/// Remove local records whose join key now has a backend-confirmed counterpart
fn supersede_local(target: &mut AccountActivities, incoming: &[Activity]) {
    let confirmed: HashSet<&str> = incoming
        .iter()
        .filter(|a| !a.is_local())
        .map(Activity::join_key)
        .collect();
    if confirmed.is_empty() {
        return;
    }

    let superseded: HashSet<String> = target
        .by_id
        .values()
        .filter(|a| a.is_local())
        .filter(|a| confirmed.contains(a.join_key()))
        .map(|a| a.id().to_string())
        .collect();
    if superseded.is_empty() {
        return;
    }

    for window in target.windows.values_mut() {
        window.ids.retain(|id| !superseded.contains(id));
    }
    for id in &superseded {
        target.by_id.remove(id);
    }
}

fn confirmed_join_keys(target: &AccountActivities) -> HashSet<String> {
    target
        .by_id
        .values()
        .filter(|a| !a.is_local())
        .map(|a| a.join_key().to_string())
        .collect()
}

fn loaded_token_streams(target: &AccountActivities) -> Vec<StreamKey> {
    target
        .windows
        .keys()
        .filter(|k| **k != StreamKey::All)
        .cloned()
        .collect()
}

fn activities_for_stream(activities: &[Activity], stream: &StreamKey) -> Vec<Activity> {
    match stream.slug() {
        None => activities.to_vec(),
        Some(slug) => activities
            .iter()
            .filter(|a| a.slugs().contains(&slug))
            .cloned()
            .collect(),
    }
}

fn prune_unreferenced(target: &mut AccountActivities) {
    let referenced: HashSet<&String> = target.windows.values().flat_map(|w| w.ids.iter()).collect();
    let orphans: Vec<String> = target
        .by_id
        .keys()
        .filter(|id| !referenced.contains(id))
        .cloned()
        .collect();
    for id in orphans {
        target.by_id.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::fixtures::tx;
    use crate::activity::{build_local_tx_id, ActivityStatus};

    fn state_with_account() -> WalletState {
        add_account(WalletState::default(), Account::new("0-mainnet"), None)
    }

    fn ids(state: &WalletState, stream: &StreamKey) -> Vec<String> {
        state
            .account_activities("0-mainnet")
            .and_then(|a| a.window(stream))
            .map(|w| w.ids.clone())
            .unwrap_or_default()
    }

    fn local(hash: &str, timestamp: i64) -> Activity {
        let mut activity = tx(&build_local_tx_id(hash, 0), timestamp);
        if let Activity::Transaction(t) = &mut activity {
            t.status = ActivityStatus::Local;
            t.external_msg_hash_norm = Some(hash.to_string());
        }
        activity
    }

    fn confirmed(id: &str, hash: &str, timestamp: i64) -> Activity {
        let mut activity = tx(id, timestamp);
        if let Activity::Transaction(t) = &mut activity {
            t.external_msg_hash_norm = Some(hash.to_string());
        }
        activity
    }

    #[test]
    fn test_past_activities_merge_sorted_and_deduplicated() {
        let state = state_with_account();
        let state = add_past_activities(state, "0-mainnet", &StreamKey::All, vec![tx("b", 20), tx("a", 10)], false);
        let state = add_past_activities(state, "0-mainnet", &StreamKey::All, vec![tx("c", 30), tx("b", 20)], false);

        assert_eq!(ids(&state, &StreamKey::All), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_history_end_is_monotonic() {
        let state = state_with_account();
        let state = add_past_activities(state, "0-mainnet", &StreamKey::All, vec![], true);
        let state = add_past_activities(state, "0-mainnet", &StreamKey::All, vec![tx("a", 1)], false);

        let acts = state.account_activities("0-mainnet").unwrap();
        assert!(acts.is_history_end_reached(&StreamKey::All));

        let state = reset_stream(state, "0-mainnet", &StreamKey::All);
        let acts = state.account_activities("0-mainnet").unwrap();
        assert!(!acts.is_history_end_reached(&StreamKey::All));
        assert!(acts.by_id.is_empty());
    }

    #[test]
    fn test_confirmed_supersedes_local_idempotently() {
        let state = state_with_account();
        let state = add_local_activities(state, "0-mainnet", vec![local("h1", 100)]);
        assert_eq!(ids(&state, &StreamKey::All).len(), 1);
        assert_eq!(ids(&state, &StreamKey::Token("toncoin".into())).len(), 1);

        let page = vec![confirmed("c1", "h1", 105)];
        let state = add_new_activities(state, "0-mainnet", page.clone());
        let state = add_new_activities(state, "0-mainnet", page);

        assert_eq!(ids(&state, &StreamKey::All), vec!["c1"]);
        assert!(ids(&state, &StreamKey::Token("toncoin".into())).contains(&"c1".to_string()));
        assert_eq!(ids(&state, &StreamKey::Token("toncoin".into())).len(), 1);
    }

    #[test]
    fn test_local_after_confirmed_is_dropped() {
        let state = state_with_account();
        let state = add_new_activities(state, "0-mainnet", vec![confirmed("c1", "h1", 105)]);
        let state = add_local_activities(state, "0-mainnet", vec![local("h1", 100)]);

        assert_eq!(ids(&state, &StreamKey::All), vec!["c1"]);
    }

    #[test]
    fn test_confirmed_tx_id_supersedes_local_without_hash() {
        let mut pending = tx(&build_local_tx_id("tron-tx", 0), 100);
        if let Activity::Transaction(t) = &mut pending {
            t.status = ActivityStatus::Local;
            t.tx_id = "tron-tx".to_string();
        }
        let state = state_with_account();
        let state = add_local_activities(state, "0-mainnet", vec![pending.clone()]);
        let state = add_new_activities(state, "0-mainnet", vec![tx("tron-tx", 105)]);
        assert_eq!(ids(&state, &StreamKey::All), vec!["tron-tx"]);

        let state = add_local_activities(state, "0-mainnet", vec![pending]);
        assert_eq!(ids(&state, &StreamKey::All), vec!["tron-tx"]);
    }

    #[test]
    fn test_cursor_ignores_local_records() {
        let state = state_with_account();
        let state = initial_activities(state, "0-mainnet", vec![tx("a", 50), tx("b", 40)], false);
        let state = add_local_activities(state, "0-mainnet", vec![local("h", 10)]);

        let acts = state.account_activities("0-mainnet").unwrap();
        assert!(acts.is_initial_loaded);
        assert_eq!(acts.last_activity_timestamp(&StreamKey::All), Some(40));
    }

    #[test]
    fn test_local_activities_do_not_open_gate() {
        let state = state_with_account();
        let state = add_local_activities(state, "0-mainnet", vec![local("h", 10)]);
        assert!(!state.is_initial_load_settled("0-mainnet"));
        assert!(state.is_initial_load_settled("removed-account"));
    }
}
