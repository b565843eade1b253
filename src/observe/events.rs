//! Completion notifications broadcast to interested observers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

const BUS_CAPACITY: usize = 16;

/// Published once per successfully delivered session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub public_reference: String,
    pub content_id: String,
    pub session_id: String,
}

impl CompletionEvent {
    pub const NAME: &'static str = "videoEnhanced";
}

/// Subscribe/notify registry for [`CompletionEvent`]s.
#[derive(Clone)]
pub struct CompletionBus {
    sender: broadcast::Sender<CompletionEvent>,
}

impl Default for CompletionBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }
}

impl CompletionBus {
    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Fire-and-forget broadcast; having no observers is not an error.
    pub fn notify(&self, event: CompletionEvent) {
        let session = event.session_id.clone();
        match self.sender.send(event) {
            Ok(observers) => debug!(session = %session, observers, "completion published"),
            Err(_) => debug!(session = %session, "completion published without observers"),
        }
    }
}
