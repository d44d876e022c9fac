/// Engine events published to subscribers (API clients, UI layers)
use crate::activity::Activity;
use crate::state::StreamKey;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Optimistic records were created for a submitted transfer
    NewLocalActivities {
        account_id: String,
        activities: Vec<Activity>,
    },
    /// The first page of the account's `All` stream landed
    InitialActivities {
        account_id: String,
        activities: Vec<Activity>,
        is_history_end_reached: bool,
    },
    /// One sync round appended older history to a stream
    PastActivitiesLoaded {
        account_id: String,
        stream: StreamKey,
        activities: Vec<Activity>,
        is_history_end_reached: bool,
    },
    /// The watcher found activities newer than the feed
    NewActivities {
        account_id: String,
        activities: Vec<Activity>,
    },
    /// A submission returned a payment link to open
    OpenUrl { url: String, is_external: bool },
}

impl EngineEvent {
    pub fn account_id(&self) -> Option<&str> {
        match self {
            EngineEvent::NewLocalActivities { account_id, .. }
            | EngineEvent::InitialActivities { account_id, .. }
            | EngineEvent::PastActivitiesLoaded { account_id, .. }
            | EngineEvent::NewActivities { account_id, .. } => Some(account_id),
            EngineEvent::OpenUrl { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Fire-and-forget; having no subscribers is fine
    pub fn publish(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = EngineEvent::OpenUrl {
            url: "ton://transfer/UQabc".to_string(),
            is_external: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "open_url");
        assert_eq!(json["is_external"], true);
        assert!(event.account_id().is_none());
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new();
        bus.publish(EngineEvent::NewActivities {
            account_id: "0-mainnet".into(),
            activities: vec![],
        });

        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::NewActivities {
            account_id: "1-mainnet".into(),
            activities: vec![],
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.account_id(), Some("1-mainnet"));
    }
}
