//! Processed-file notifications
//!
//! Observers (the CLI, a dashboard) hold an [`EventSubscription`] handed out
//! by the pipeline's [`EventBus`]. There is no global registry; the number of
//! live subscriptions is capped.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::ProcessingState;
use crate::error::IngestError;

/// Events buffered per subscriber before the slowest one starts lagging
const EVENT_BUFFER: usize = 256;

/// Published exactly once per `IngestionPipeline::process` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileProcessedEvent {
    pub file_name: String,
    pub success: bool,
    /// Counter value after this file was counted
    pub total_processed: u64,
    /// Where the file ended up
    pub final_state: ProcessingState,
}

#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<FileProcessedEvent>,
    max_subscribers: usize,
    // serializes the count check with the subscribe call
    gate: std::sync::Mutex<()>,
}

impl EventBus {
    pub fn new(max_subscribers: usize) -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sender,
            max_subscribers,
            gate: std::sync::Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> Result<EventSubscription, IngestError> {
        let _guard = self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.sender.receiver_count() >= self.max_subscribers {
            return Err(IngestError::SubscriberLimit(self.max_subscribers));
        }

        Ok(EventSubscription {
            receiver: self.sender.subscribe(),
        })
    }

    /// Deliver to every live subscriber. No subscribers is not an error.
    pub fn publish(&self, event: FileProcessedEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving half of an [`EventBus`]; dropping it frees a subscriber slot
#[derive(Debug)]
pub struct EventSubscription {
    receiver: broadcast::Receiver<FileProcessedEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once the bus is gone.
    ///
    /// Events missed by a lagging subscriber are skipped with a warning.
    pub async fn recv(&mut self) -> Option<FileProcessedEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event subscriber lagged, skipped {} events", missed);
                },
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
