/// Pending transfer registry
///
/// A pending transfer reserves a wallet address while a message is signed
/// elsewhere. Only one transfer per address may be pending; a second request
/// for the same address waits until the first is released.
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

struct PendingEntry {
    account_id: String,
    address: String,
    released: watch::Sender<bool>,
}

/// Handle to a reserved address
#[derive(Clone)]
pub struct PendingTransfer {
    pub id: String,
    pub account_id: String,
    pub address: String,
    released: watch::Receiver<bool>,
}

impl PendingTransfer {
    pub fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    /// Resolves once the transfer has been released, never with an error
    pub async fn wait(&self) {
        let mut released = self.released.clone();
        let _ = released.wait_for(|done| *done).await;
    }
}

impl std::fmt::Debug for PendingTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransfer")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("address", &self.address)
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct PendingTransferRegistry {
    entries: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl PendingTransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `address`, waiting for any earlier reservation of it to end
    pub async fn create(&self, account_id: &str, address: &str) -> PendingTransfer {
        loop {
            let mut entries = self.entries.lock().await;
            let previous = entries
                .values()
                .find(|e| e.address == address)
                .map(|e| e.released.subscribe());

            match previous {
                Some(mut released) => {
                    drop(entries);
                    debug!("Waiting for pending transfer on {} to finish", address);
                    let _ = released.wait_for(|done| *done).await;
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    let (tx, rx) = watch::channel(false);
                    entries.insert(
                        id.clone(),
                        PendingEntry {
                            account_id: account_id.to_string(),
                            address: address.to_string(),
                            released: tx,
                        },
                    );
                    info!("Pending transfer {} created for {}", id, address);
                    return PendingTransfer {
                        id,
                        account_id: account_id.to_string(),
                        address: address.to_string(),
                        released: rx,
                    };
                }
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<PendingTransfer> {
        let entries = self.entries.lock().await;
        entries.get(id).map(|entry| PendingTransfer {
            id: id.to_string(),
            account_id: entry.account_id.clone(),
            address: entry.address.clone(),
            released: entry.released.subscribe(),
        })
    }

    /// Release a reservation. Returns false if it was already released.
    pub async fn release(&self, id: &str) -> bool {
        let removed = self.entries.lock().await.remove(id);
        match removed {
            Some(entry) => {
                entry.released.send_replace(true);
                debug!("Pending transfer {} released", id);
                true
            }
            None => false,
        }
    }

    /// User-initiated release
    pub async fn cancel(&self, id: &str) -> bool {
        let cancelled = self.release(id).await;
        if cancelled {
            info!("Pending transfer {} cancelled", id);
        }
        cancelled
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_releases_exactly_once() {
        let registry = PendingTransferRegistry::new();
        let pending = registry.create("0-mainnet", "UQwallet").await;
        assert!(!pending.is_released());

        assert!(registry.cancel(&pending.id).await);
        assert!(!registry.cancel(&pending.id).await);
        assert!(pending.is_released());
        pending.wait().await;
        assert!(registry.get(&pending.id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_reservation_waits_for_first() {
        let registry = PendingTransferRegistry::new();
        let first = registry.create("0-mainnet", "UQwallet").await;

        let waiting = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.create("0-mainnet", "UQwallet").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiting.is_finished());
        assert_eq!(registry.len().await, 1);

        registry.release(&first.id).await;
        let second = waiting.await.unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_other_addresses_do_not_wait() {
        let registry = PendingTransferRegistry::new();
        registry.create("0-mainnet", "UQwallet").await;
        registry.create("1-mainnet", "UQother").await;
        assert_eq!(registry.len().await, 2);
    }
}
