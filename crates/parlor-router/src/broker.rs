//! The [`Broker`] trait — topic-based pub/sub.

use std::future::Future;

/// Errors that can occur talking to the broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Publishing to a topic failed.
    #[error("publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// Subscribing to a topic failed.
    #[error("subscribe to {topic} failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },
}

/// Topic-based pub/sub, the fan-out backbone between relay instances.
///
/// Every room maps to one topic; every instance that hosts a member of
/// that room subscribes to it. Publishing is fire-and-forget: a topic
/// with no subscribers swallows the payload without error.
///
/// Payloads are opaque bytes at this layer. The router encodes
/// envelopes before publishing and decodes them after receiving, so a
/// networked broker (e.g. NATS) carries exactly what an in-process one
/// does.
///
/// The futures are required to be `Send` because the router awaits
/// them inside spawned forwarder and session tasks; implementations
/// written as `async fn` satisfy the bound automatically.
pub trait Broker: Send + Sync + 'static {
    /// The per-topic subscription handle.
    type Subscription: BrokerSubscription;

    /// Publishes a payload to a topic.
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Subscribes to a topic. Each subscription receives every payload
    /// published to the topic after this call returns.
    fn subscribe(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<Self::Subscription, BrokerError>> + Send;
}

/// A live subscription to one topic.
///
/// Dropping the subscription unsubscribes.
pub trait BrokerSubscription: Send + 'static {
    /// Waits for the next payload.
    ///
    /// Returns `Ok(None)` when the subscription has ended and no more
    /// payloads will arrive.
    fn next(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, BrokerError>> + Send;
}
