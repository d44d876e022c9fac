/// Activity engine: owns the store and the per-engine registries and exposes
/// every activity operation. Cheap to clone; clones share all state.
use crate::account::Account;
use crate::activity::Activity;
use crate::chain::{ChainRegistry, SignedTransfer, SubmittedTransfer, TransferOptions};
use crate::config::Config;
use crate::error::{Result, WalletError};
use crate::events::{EngineEvent, EventBus};
use crate::filter::{Settings, VisibilityFilter};
use crate::initial_load::InitialLoadGate;
use crate::local::{LocalActivityFactory, LocalTransactionParams};
use crate::pending::{PendingTransfer, PendingTransferRegistry};
use crate::reducers;
use crate::state::{StreamKey, Store, WalletState};
use crate::storage::ActivityStore;
use crate::throttle::{Job, Throttle};
use crate::tokens::{transfer_slug, Chain};
use futures_util::FutureExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Result of [`ActivityEngine::submit_transfer`]
#[derive(Debug, Clone)]
pub struct SubmitTransferOutcome {
    pub submitted: SubmittedTransfer,
    /// Tx id of the created local activity
    pub tx_id: Option<String>,
}

#[derive(Clone)]
pub struct ActivityEngine {
    pub(crate) config: Config,
    pub(crate) store: Store,
    pub(crate) chains: ChainRegistry,
    pub(crate) filter: VisibilityFilter,
    factory: LocalActivityFactory,
    throttle: Throttle,
    pub(crate) gate: InitialLoadGate,
    pending: PendingTransferRegistry,
    pub(crate) events: EventBus,
    storage: Option<ActivityStore>,
}

impl ActivityEngine {
    /// Create an engine. Opens the activity store when `config.data_dir` is set.
    pub fn new(config: Config, chains: ChainRegistry) -> Result<Self> {
        let storage = match &config.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Some(ActivityStore::new(dir)?)
            }
            None => None,
        };

        let store = Store::new(WalletState::default());
        let gate = InitialLoadGate::new(
            store.clone(),
            config.initial_load_poll_interval,
            config.initial_load_max_attempts,
        );

        Ok(Self {
            factory: LocalActivityFactory::new(chains.clone()),
            throttle: Throttle::new(config.past_activity_delay),
            pending: PendingTransferRegistry::new(),
            filter: VisibilityFilter::new(),
            events: EventBus::new(),
            config,
            store,
            chains,
            gate,
            storage,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn filter(&self) -> &VisibilityFilter {
        &self.filter
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn account(&self, account_id: &str) -> Result<Account> {
        self.store
            .read(|s| s.account(account_id).map(|a| a.account.clone()))
            .await
            .ok_or_else(|| WalletError::AccountNotFound(account_id.to_string()))
    }

    pub async fn account_ids(&self) -> Vec<String> {
        self.store.read(|s| s.accounts.keys().cloned().collect()).await
    }

    /// Register an account, restoring persisted activities when available
    pub async fn add_account(&self, account: Account) -> Result<()> {
        account.network()?;
        let restored = match &self.storage {
            Some(storage) => storage.load_account(&account.id)?,
            None => None,
        };
        if let Some(restored) = &restored {
            let activities: Vec<Activity> = restored.by_id.values().cloned().collect();
            self.filter.observe(&account.id, &activities);
            info!("Restored {} activities for {}", activities.len(), account.id);
        }

        let account_id = account.id.clone();
        self.store
            .update(|s| reducers::add_account(s, account, restored))
            .await;
        info!("Account {} added", account_id);
        Ok(())
    }

    pub async fn remove_account(&self, account_id: &str) -> Result<()> {
        self.store
            .update(|s| reducers::remove_account(s, account_id))
            .await;
        self.filter.poisoning().forget(account_id);
        if let Some(storage) = &self.storage {
            storage.remove_account(account_id)?;
        }
        info!("Account {} removed", account_id);
        Ok(())
    }

    pub async fn update_settings(&self, settings: Settings) {
        self.store
            .update(|s| reducers::update_settings(s, settings))
            .await;
    }

    /// Stream contents in feed order, hidden activities dropped
    pub async fn visible_activities(&self, account_id: &str, stream: &StreamKey) -> Vec<Activity> {
        self.store
            .read(|s| {
                let Some(activities) = s.account_activities(account_id) else {
                    return Vec::new();
                };
                activities
                    .activities(stream)
                    .into_iter()
                    .filter(|a| !self.filter.is_hidden(account_id, a, &s.settings))
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Stream contents in feed order, including hidden activities
    pub async fn stream_activities(&self, account_id: &str, stream: &StreamKey) -> Vec<Activity> {
        self.store
            .read(|s| {
                s.account_activities(account_id)
                    .map(|a| a.activities(stream).into_iter().cloned().collect())
                    .unwrap_or_default()
            })
            .await
    }

    /// Ask for older history of a stream. Bursts of calls coalesce into at
    /// most one leading and one trailing sync. With `should_load_with_budget`
    /// a follow-up round is queued right away.
    pub async fn trigger_past_activities(
        &self,
        account_id: &str,
        stream: &StreamKey,
        should_load_with_budget: bool,
    ) {
        let key = format!("{} {}", account_id, stream);
        let job: Job = {
            let engine = self.clone();
            let account_id = account_id.to_string();
            let stream = stream.clone();
            Arc::new(move || {
                let engine = engine.clone();
                let account_id = account_id.clone();
                let stream = stream.clone();
                async move {
                    if let Err(e) = engine.sync_stream(&account_id, &stream).await {
                        warn!("Sync of {} {} failed: {}", account_id, stream, e);
                    }
                }
                .boxed()
            })
        };

        self.throttle.trigger(&key, job.clone()).await;
        if should_load_with_budget {
            self.throttle.trigger(&key, job).await;
        }
    }

    /// Drop a stream's window so it pages again from the newest entry
    pub async fn reset_stream(&self, account_id: &str, stream: &StreamKey) {
        self.store
            .update(|s| reducers::reset_stream(s, account_id, stream))
            .await;
        debug!("Stream {} {} reset", account_id, stream);
        self.persist(account_id).await;
    }

    /// Optimistic records for transfers the caller already submitted
    pub async fn create_local_transactions(
        &self,
        account_id: &str,
        chain: Chain,
        params: Vec<LocalTransactionParams>,
    ) -> Result<Vec<Activity>> {
        let account = self.account(account_id).await?;
        let activities = self
            .factory
            .build_local_transactions(&account, chain, params, now_ms())?;
        self.publish_local(account_id, activities.clone()).await;
        Ok(activities)
    }

    /// Pending records from a pre-submission simulation of a message
    pub async fn create_local_activities_from_emulation(
        &self,
        account_id: &str,
        chain: Chain,
        msg_hash_normalized: &str,
        emulated: Vec<Activity>,
    ) -> Result<Vec<Activity>> {
        let account = self.account(account_id).await?;
        let activities = self.factory.convert_emulation(
            &account,
            chain,
            msg_hash_normalized,
            emulated,
            now_ms(),
        )?;
        self.publish_local(account_id, activities.clone()).await;
        Ok(activities)
    }

    async fn publish_local(&self, account_id: &str, activities: Vec<Activity>) {
        if activities.is_empty() {
            return;
        }
        debug!("{} local activities for {}", activities.len(), account_id);
        self.events.publish(EngineEvent::NewLocalActivities {
            account_id: account_id.to_string(),
            activities: activities.clone(),
        });
        self.store
            .update(|s| reducers::add_local_activities(s, account_id, activities))
            .await;
        self.persist(account_id).await;
    }

    /// Submit a transfer and, on success, record it locally so the feed shows
    /// it before any backend does. Submission errors propagate untouched.
    pub async fn submit_transfer(
        &self,
        chain: Chain,
        options: TransferOptions,
        should_create_local_activity: bool,
    ) -> Result<SubmitTransferOutcome> {
        let account = self.account(&options.account_id).await?;
        let adapter = self.chains.get(chain)?;
        let submitted = adapter.submit_transfer(&options).await?;
        info!("Transfer submitted on {} for {}", chain, options.account_id);

        if !should_create_local_activity {
            return Ok(SubmitTransferOutcome {
                submitted,
                tx_id: None,
            });
        }

        let slug = transfer_slug(chain, options.token_address.as_deref());
        let fee = options.real_fee.or(options.fee).unwrap_or_default();
        let mut params = match &submitted {
            SubmittedTransfer::Message {
                msg_hash_normalized,
                encrypted_comment,
                payment_link,
                with_w5_gasless,
            } => {
                if let Some(url) = payment_link {
                    self.events.publish(EngineEvent::OpenUrl {
                        url: url.clone(),
                        is_external: true,
                    });
                }
                let mut params = LocalTransactionParams::new(
                    msg_hash_normalized.clone(),
                    options.to_address.clone(),
                    options.amount,
                    slug,
                );
                if !options.should_encrypt {
                    params.comment = options.comment.clone();
                }
                params.encrypted_comment = encrypted_comment.clone();
                params.external_msg_hash_norm = Some(msg_hash_normalized.clone());
                params.extra.with_w5_gasless = *with_w5_gasless;
                params
            }
            SubmittedTransfer::Transaction { tx_id } => {
                let mut params = LocalTransactionParams::new(
                    tx_id.clone(),
                    options.to_address.clone(),
                    options.amount,
                    slug,
                );
                params.comment = options.comment.clone();
                params
            }
        };
        params.fee = fee;
        params.from_address = account.address(chain).map(str::to_string);

        let created = self
            .create_local_transactions(&options.account_id, chain, vec![params])
            .await?;
        let tx_id = created
            .first()
            .and_then(Activity::as_transaction)
            .map(|tx| tx.tx_id.clone());

        Ok(SubmitTransferOutcome { submitted, tx_id })
    }

    /// Reserve the account's wallet address on `chain` for an externally signed transfer
    pub async fn create_pending_transfer(
        &self,
        account_id: &str,
        chain: Chain,
    ) -> Result<PendingTransfer> {
        let account = self.account(account_id).await?;
        let address = account.address(chain).ok_or_else(|| {
            WalletError::PendingTransfer(format!("{} has no {} wallet", account_id, chain))
        })?;
        Ok(self.pending.create(account_id, address).await)
    }

    pub async fn pending_transfer(&self, id: &str) -> Option<PendingTransfer> {
        self.pending.get(id).await
    }

    /// Release a pending transfer the user backed out of
    pub async fn cancel_pending_transfer(&self, id: &str) -> bool {
        self.pending.cancel(id).await
    }

    /// Broadcast a message signed elsewhere and record it locally.
    /// The pending transfer is released whatever the outcome.
    pub async fn send_signed_transfer_message(
        &self,
        chain: Chain,
        message: SignedTransfer,
        pending_transfer_id: &str,
    ) -> Result<String> {
        let pending = self.pending.get(pending_transfer_id).await.ok_or_else(|| {
            WalletError::PendingTransfer(format!("Unknown pending transfer {}", pending_transfer_id))
        })?;

        let sent = self.send_signed(&pending, chain, &message).await;
        self.pending.release(pending_transfer_id).await;
        let msg_hash_normalized = sent?;

        let mut params = message.local_activity;
        params.tx_id = msg_hash_normalized.clone();
        params.external_msg_hash_norm = Some(msg_hash_normalized.clone());
        self.create_local_transactions(&pending.account_id, chain, vec![params])
            .await?;

        Ok(msg_hash_normalized)
    }

    async fn send_signed(
        &self,
        pending: &PendingTransfer,
        chain: Chain,
        message: &SignedTransfer,
    ) -> Result<String> {
        let account = self.account(&pending.account_id).await?;
        let adapter = self.chains.get(chain)?;
        adapter
            .send_signed_message(&account, message, &pending.id)
            .await
    }

    /// Best-effort write of the account's windows
    pub(crate) async fn persist(&self, account_id: &str) {
        let Some(storage) = &self.storage else {
            return;
        };
        let Some(activities) = self
            .store
            .read(|s| s.account_activities(account_id).cloned())
            .await
        else {
            return;
        };
        if let Err(e) = storage.save_account(account_id, &activities) {
            warn!("Failed to persist activities of {}: {}", account_id, e);
        }
    }

    pub fn flush(&self) -> Result<()> {
        match &self.storage {
            Some(storage) => storage.flush(),
            None => Ok(()),
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
