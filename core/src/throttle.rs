/// Coalescing trigger: throttled, never-overlapping runs per key
///
/// The first trigger for an idle key runs the job at once. Triggers that
/// arrive while the job runs, or within `delay` of its start, collapse into a
/// single trailing run. The key's state is dropped once a window passes with
/// no new trigger.
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Work scheduled under a key. Called once per run.
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Default)]
struct ThrottleState {
    /// A trigger arrived after the current run was scheduled
    pending: bool,
    runs: u64,
}

#[derive(Clone)]
pub struct Throttle {
    delay: Duration,
    entries: Arc<Mutex<HashMap<String, ThrottleState>>>,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Request a run of `job` under `key`
    pub async fn trigger(&self, key: &str, job: Job) {
        let mut entries = self.entries.lock().await;
        if let Some(state) = entries.get_mut(key) {
            state.pending = true;
            debug!("Throttle {}: coalesced into trailing run", key);
            return;
        }
        entries.insert(key.to_string(), ThrottleState::default());
        drop(entries);

        let throttle = self.clone();
        let key = key.to_string();
        tokio::spawn(async move { throttle.drive(key, job).await });
    }

    async fn drive(&self, key: String, job: Job) {
        loop {
            let started = Instant::now();
            job().await;
            tokio::time::sleep_until(started + self.delay).await;

            let mut entries = self.entries.lock().await;
            match entries.get_mut(&key) {
                Some(state) if state.pending => {
                    state.pending = false;
                    state.runs += 1;
                    debug!("Throttle {}: trailing run #{}", key, state.runs);
                }
                _ => {
                    entries.remove(&key);
                    break;
                }
            }
        }
    }

    /// Whether a run is in progress or a window is still open for `key`
    pub async fn is_active(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}
