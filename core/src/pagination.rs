/// Pagination controller and the chain fetch shims behind it
///
/// A sync round walks backwards from the stream's cursor until it has
/// collected a batch worth of visible activities or a batch worth of raw
/// ones, whichever comes first. Nothing is written if a source fails midway;
/// the next trigger retries from the same cursor.
use crate::account::Account;
use crate::activity::{sort_activities, Activity};
use crate::engine::ActivityEngine;
use crate::error::{Result, WalletError};
use crate::events::EngineEvent;
use crate::merge::merge_activities_to_max_time;
use crate::reducers;
use crate::state::StreamKey;
use crate::tokens::{chain_by_slug, Chain};
use tracing::{debug, info};

impl ActivityEngine {
    /// Fetch one page of older history for a stream.
    /// The `All` stream asks every chain in parallel and keeps the gap-free part.
    pub async fn fetch_past_activities(
        &self,
        account_id: &str,
        stream: &StreamKey,
        before_timestamp: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Activity>> {
        let account = self.account(account_id).await?;
        let activities = match stream.slug() {
            Some(slug) => {
                let chain = chain_by_slug(slug)?;
                self.fetch_chain_slice(&account, chain, Some(slug), before_timestamp, limit)
                    .await?
            }
            None => {
                let (ton, tron) = tokio::join!(
                    self.fetch_chain_slice(&account, Chain::Ton, None, before_timestamp, limit),
                    self.fetch_chain_slice(&account, Chain::Tron, None, before_timestamp, limit),
                );
                merge_activities_to_max_time(ton?, tron?, limit)
            }
        };

        self.filter.observe(account_id, &activities);
        Ok(activities)
    }

    async fn fetch_chain_slice(
        &self,
        account: &Account,
        chain: Chain,
        token_slug: Option<&str>,
        before_timestamp: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Activity>> {
        let Some(adapter) = self.chains.find(chain) else {
            return Ok(Vec::new());
        };
        if !account.has_chain(chain) {
            return Ok(Vec::new());
        }

        adapter
            .fetch_page(account, token_slug, before_timestamp, limit)
            .await
            .map_err(|e| match e {
                WalletError::SourceUnavailable(_) => e,
                other => WalletError::SourceUnavailable(format!("{}: {}", chain, other)),
            })
    }

    /// Load the next chunk of older history for one stream
    pub async fn sync_stream(&self, account_id: &str, stream: &StreamKey) -> Result<()> {
        if !self.gate.wait(account_id).await {
            debug!("Skipping sync of {} {}: initial load not settled", account_id, stream);
            return Ok(());
        }

        let Some((is_history_end_reached, cursor)) = self
            .store
            .read(|s| {
                s.account_activities(account_id).map(|a| {
                    (
                        a.is_history_end_reached(stream),
                        a.last_activity_timestamp(stream),
                    )
                })
            })
            .await
        else {
            debug!("Skipping sync of {} {}: account removed", account_id, stream);
            return Ok(());
        };
        if is_history_end_reached {
            return Ok(());
        }

        let limit = self.config.activity_batch_size;
        let settings = self.store.read(|s| s.settings.clone()).await;
        let mut to_timestamp = cursor;
        let mut fetched: Vec<Activity> = Vec::new();
        let mut visible = 0;
        let mut history_end = false;

        loop {
            let page = match self
                .fetch_past_activities(account_id, stream, to_timestamp, limit)
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_unavailable() => {
                    debug!("Sync of {} {} aborted: {}", account_id, stream, e);
                    return Ok(());
                }
                Err(WalletError::AccountNotFound(_)) => return Ok(()),
                Err(e) => return Err(e),
            };

            let Some(oldest) = page.last().map(Activity::timestamp) else {
                history_end = true;
                break;
            };

            visible += self.filter.count_visible(account_id, &page, &settings);
            fetched.extend(page);
            to_timestamp = Some(oldest);

            if visible >= limit || fetched.len() >= limit {
                break;
            }
        }

        sort_activities(&mut fetched);
        debug!(
            "Sync of {} {}: {} fetched, {} visible, history end {}",
            account_id,
            stream,
            fetched.len(),
            visible,
            history_end
        );

        self.store
            .update(|s| {
                reducers::add_past_activities(s, account_id, stream, fetched.clone(), history_end)
            })
            .await;
        self.events.publish(EngineEvent::PastActivitiesLoaded {
            account_id: account_id.to_string(),
            stream: stream.clone(),
            activities: fetched,
            is_history_end_reached: history_end,
        });
        self.persist(account_id).await;
        Ok(())
    }

    /// First page of the `All` stream. Opens the initial-load gate.
    /// Returns false if a source was unavailable; call again to retry.
    pub async fn load_initial_activities(&self, account_id: &str) -> Result<bool> {
        let limit = self.config.activity_batch_size;
        let page = match self
            .fetch_past_activities(account_id, &StreamKey::All, None, limit)
            .await
        {
            Ok(page) => page,
            Err(e) if e.is_unavailable() => {
                debug!("Initial load of {} deferred: {}", account_id, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let history_end = page.is_empty();
        info!("Initial activities of {}: {}", account_id, page.len());
        self.store
            .update(|s| reducers::initial_activities(s, account_id, page.clone(), history_end))
            .await;
        self.events.publish(EngineEvent::InitialActivities {
            account_id: account_id.to_string(),
            activities: page,
            is_history_end_reached: history_end,
        });
        self.persist(account_id).await;
        Ok(true)
    }

    /// Fetch the newest activities and merge whatever the feed lacks. This is
    /// how backend confirmations replace local records.
    ///
    /// Pages walk backwards from the newest entry until they reach the newest
    /// backend activity already in the `All` window, so a burst larger than one
    /// batch leaves no hole above the window.
    pub async fn refresh_latest(&self, account_id: &str) -> Result<usize> {
        let limit = self.config.activity_batch_size;
        let newest_known = self
            .store
            .read(|s| {
                s.account_activities(account_id)
                    .and_then(|a| a.newest_activity_timestamp(&StreamKey::All))
            })
            .await;

        let mut to_timestamp = None;
        let mut fetched: Vec<Activity> = Vec::new();
        loop {
            let page = match self
                .fetch_past_activities(account_id, &StreamKey::All, to_timestamp, limit)
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_unavailable() => {
                    debug!("Refresh of {} skipped: {}", account_id, e);
                    return Ok(0);
                }
                Err(e) => return Err(e),
            };

            let Some(oldest) = page.last().map(Activity::timestamp) else {
                break;
            };
            fetched.extend(page);
            if newest_known.map_or(true, |known| oldest <= known) {
                break;
            }
            to_timestamp = Some(oldest);
        }
        if fetched.is_empty() {
            return Ok(0);
        }

        let fresh: Vec<Activity> = self
            .store
            .read(|s| {
                let known = s.account_activities(account_id);
                fetched
                    .iter()
                    .filter(|a| known.map_or(true, |k| !k.by_id.contains_key(a.id())))
                    .cloned()
                    .collect()
            })
            .await;

        // Known ids are merged again so status changes land too
        let count = fresh.len();
        self.store
            .update(|s| reducers::add_new_activities(s, account_id, fetched))
            .await;
        if count > 0 {
            self.events.publish(EngineEvent::NewActivities {
                account_id: account_id.to_string(),
                activities: fresh,
            });
        }
        self.persist(account_id).await;
        debug!("{} new activities for {}", count, account_id);
        Ok(count)
    }
}
