//! Process-wide notification channel.
//!
//! Every component publishes into one broadcast channel; views subscribe and
//! filter for the events they care about.

use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AppEvent {
    /// The favorites collection changed; views should reload it.
    FavoritesChanged,
    /// A persisted key was changed by another store instance.
    StorageChanged { key: String },
    Generation(GenerationEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "camelCase")]
pub enum GenerationEvent {
    #[serde(rename_all = "camelCase")]
    BatchStarted {
        batch_number: usize,
        total_batches: usize,
        batch_size: usize,
    },
    #[serde(rename_all = "camelCase")]
    BatchCompleted {
        completed_batches: usize,
        total_batches: usize,
        images_so_far: usize,
    },
    #[serde(rename_all = "camelCase")]
    RunFailed { batch_number: usize, message: String },
    #[serde(rename_all = "camelCase")]
    RunFinished { image_count: usize, celebrate: bool },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    /// Sends to all current subscribers. Having none is fine.
    pub fn publish(&self, event: AppEvent) {
        let receivers = self.sender.send(event).unwrap_or(0);
        log::trace!("Published app event to {} subscriber(s)", receivers);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
