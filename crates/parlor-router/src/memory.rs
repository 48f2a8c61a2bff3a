//! In-memory [`Broker`] implementation over tokio broadcast channels.

use std::collections::HashMap;

use tokio::sync::{Mutex, broadcast};

use crate::{Broker, BrokerError, BrokerSubscription};

/// Buffered payloads per topic before slow subscribers start lagging.
const TOPIC_CAPACITY: usize = 256;

/// A [`Broker`] backed by one `tokio::sync::broadcast` channel per
/// topic.
///
/// The default broker for a single relay instance and for tests. Like
/// its networked counterparts it is at-most-once: a subscriber that
/// falls more than [`TOPIC_CAPACITY`] payloads behind loses the oldest
/// ones.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl MemoryBroker {
    /// Creates a broker with no topics.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Broker for MemoryBroker {
    type Subscription = MemorySubscription;

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        let mut topics = self.topics.lock().await;
        if let Some(sender) = topics.get(topic) {
            if sender.send(payload.to_vec()).is_err() {
                // Every receiver is gone; drop the dead channel.
                topics.remove(topic);
            }
        }
        // No subscribers is not an error — publish is fire-and-forget.
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<Self::Subscription, BrokerError> {
        let mut topics = self.topics.lock().await;
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0);
        Ok(MemorySubscription {
            topic: topic.to_string(),
            rx: sender.subscribe(),
        })
    }
}

/// Subscription handle for [`MemoryBroker`].
pub struct MemorySubscription {
    topic: String,
    rx: broadcast::Receiver<Vec<u8>>,
}

impl BrokerSubscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<Vec<u8>>, BrokerError> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Ok(Some(payload)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // At-most-once: note the loss and keep reading.
                    tracing::warn!(
                        topic = %self.topic,
                        skipped,
                        "subscriber lagged, dropped payloads"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Ok(None);
                }
            }
        }
    }
}
