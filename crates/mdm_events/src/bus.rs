//! Topic-based publish/subscribe.

use crate::envelope::Envelope;
use crate::error::{BusError, BusResult};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{trace, warn};
use uuid::Uuid;

/// A message delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Encoded envelope.
    pub payload: Bytes,
}

/// Receiving end of a topic subscription.
///
/// Messages are buffered per subscriber; a slow subscriber never causes
/// messages to be dropped.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    inlet: Inlet,
}

#[derive(Debug)]
enum Inlet {
    Bounded(mpsc::Receiver<BusMessage>),
    Unbounded(mpsc::UnboundedReceiver<BusMessage>),
}

impl Subscription {
    /// Returns the subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receives the next message.
    ///
    /// Returns `None` once the bus is closed and every buffered message has
    /// been received.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        match &mut self.inlet {
            Inlet::Bounded(rx) => rx.recv().await,
            Inlet::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Receives a buffered message without waiting.
    pub fn try_recv(&mut self) -> Result<BusMessage, TryRecvError> {
        match &mut self.inlet {
            Inlet::Bounded(rx) => rx.try_recv(),
            Inlet::Unbounded(rx) => rx.try_recv(),
        }
    }

    fn closed(topic: &str) -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self {
            topic: topic.to_string(),
            inlet: Inlet::Unbounded(rx),
        }
    }
}

/// A publish/subscribe bus.
///
/// Every message published on a topic is delivered to every subscription
/// taken on that topic before publishing.
pub trait Bus: Send + Sync {
    /// Subscribes to a topic.
    fn subscribe(&self, topic: &str) -> Subscription;

    /// Publishes an encoded message.
    ///
    /// Publishing to a topic with no subscribers succeeds.
    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()>;
}

/// Typed publishing on top of [`Bus`].
pub trait BusExt: Bus {
    /// Wraps `event` in an [`Envelope`], encodes it, and publishes it.
    ///
    /// Returns the envelope ID.
    fn publish_event<T: Serialize>(&self, topic: &str, event: T) -> BusResult<Uuid> {
        let envelope = Envelope::new(event);
        let payload = envelope.encode()?;
        self.publish(topic, payload)?;
        Ok(envelope.id)
    }
}

impl<B: Bus + ?Sized> BusExt for B {}

/// Configuration for [`LocalBus`].
#[derive(Debug, Clone, Default)]
pub struct BusConfig {
    /// Messages buffered per subscriber. `None` buffers without limit.
    ///
    /// With a limit, a publish that would overflow any subscriber's buffer
    /// fails with [`BusError::Full`] and is delivered to no one.
    pub capacity: Option<usize>,
}

impl BusConfig {
    /// Creates a configuration with unbounded subscriber buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits every subscriber's buffer to `capacity` messages.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }
}

#[derive(Debug)]
enum Outlet {
    Bounded(mpsc::Sender<BusMessage>),
    Unbounded(mpsc::UnboundedSender<BusMessage>),
}

impl Outlet {
    fn is_closed(&self) -> bool {
        match self {
            Self::Bounded(tx) => tx.is_closed(),
            Self::Unbounded(tx) => tx.is_closed(),
        }
    }

    fn has_room(&self) -> bool {
        match self {
            Self::Bounded(tx) => tx.capacity() > 0,
            Self::Unbounded(_) => true,
        }
    }

    fn send(&self, message: BusMessage) -> bool {
        match self {
            Self::Bounded(tx) => tx.try_send(message).is_ok(),
            Self::Unbounded(tx) => tx.send(message).is_ok(),
        }
    }
}

/// In-process bus with one `tokio::sync::mpsc` buffer per subscriber.
#[derive(Debug, Default)]
pub struct LocalBus {
    config: BusConfig,
    topics: Mutex<HashMap<String, Vec<Outlet>>>,
    closed: AtomicBool,
}

impl LocalBus {
    /// Creates a bus with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus with the given configuration.
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Closes the bus.
    ///
    /// Subscribers drain what is already buffered and then receive `None`;
    /// further publishes fail with [`BusError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.topics.lock().clear();
    }

    /// Returns the number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map(|outlets| outlets.iter().filter(|o| !o.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Bus for LocalBus {
    fn subscribe(&self, topic: &str) -> Subscription {
        if self.closed.load(Ordering::SeqCst) {
            return Subscription::closed(topic);
        }
        let (outlet, inlet) = match self.config.capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity);
                (Outlet::Bounded(tx), Inlet::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Outlet::Unbounded(tx), Inlet::Unbounded(rx))
            }
        };
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(outlet);
        Subscription {
            topic: topic.to_string(),
            inlet,
        }
    }

    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        let mut topics = self.topics.lock();
        let Some(outlets) = topics.get_mut(topic) else {
            trace!(topic, "published with no subscribers");
            return Ok(());
        };
        outlets.retain(|outlet| !outlet.is_closed());
        if let Some(capacity) = self.config.capacity {
            if !outlets.iter().all(Outlet::has_room) {
                warn!(topic, capacity, "subscriber buffer full, rejecting publish");
                return Err(BusError::Full {
                    topic: topic.to_string(),
                    capacity,
                });
            }
        }
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
        };
        outlets.retain(|outlet| outlet.send(message.clone()));
        if outlets.is_empty() {
            trace!(topic, "published with no subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandQueuedEvent;
    use crate::topics::COMMAND_QUEUED_TOPIC;

    #[tokio::test]
    async fn local_bus_round_trip() {
        let bus = LocalBus::new();
        let mut sub = bus.subscribe("mdm.Test");
        bus.publish("mdm.Test", Bytes::from_static(b"ping")).unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(sub.topic(), "mdm.Test");
        assert_eq!(msg.topic, "mdm.Test");
        assert_eq!(msg.payload, Bytes::from_static(b"ping"));
    }

    #[tokio::test]
    async fn every_subscriber_receives() {
        let bus = LocalBus::new();
        let mut a = bus.subscribe("t");
        let mut b = bus.subscribe("t");
        let mut other = bus.subscribe("other");
        assert_eq!(bus.subscriber_count("t"), 2);

        bus.publish("t", Bytes::from_static(b"x")).unwrap();
        assert_eq!(a.recv().await.unwrap().payload, Bytes::from_static(b"x"));
        assert_eq!(b.recv().await.unwrap().payload, Bytes::from_static(b"x"));
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus = LocalBus::new();
        assert!(bus.publish("nobody", Bytes::new()).is_ok());
    }

    #[tokio::test]
    async fn typed_publish() {
        let bus = LocalBus::new();
        let mut sub = bus.subscribe(COMMAND_QUEUED_TOPIC);
        let id = bus
            .publish_event(
                COMMAND_QUEUED_TOPIC,
                CommandQueuedEvent {
                    udid: "ABCD".into(),
                    command_uuid: "CMD-1".into(),
                },
            )
            .unwrap();

        let msg = sub.recv().await.unwrap();
        let envelope: Envelope<CommandQueuedEvent> = Envelope::decode(&msg.payload).unwrap();
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.event.command_uuid, "CMD-1");
    }

    #[tokio::test]
    async fn close_ends_subscriptions() {
        let bus = LocalBus::new();
        let mut sub = bus.subscribe("t");
        bus.publish("t", Bytes::from_static(b"last")).unwrap();
        bus.close();

        assert_eq!(sub.recv().await.unwrap().payload, Bytes::from_static(b"last"));
        assert!(sub.recv().await.is_none());
        assert!(matches!(
            bus.publish("t", Bytes::new()),
            Err(BusError::Closed)
        ));
        assert!(bus.subscribe("t").recv().await.is_none());
    }

    #[tokio::test]
    async fn unbounded_buffers_keep_every_message() {
        let bus = LocalBus::new();
        let mut sub = bus.subscribe("t");
        for i in 0..1000u32 {
            bus.publish("t", Bytes::from(i.to_be_bytes().to_vec())).unwrap();
        }
        for i in 0..1000u32 {
            let msg = sub.recv().await.unwrap();
            assert_eq!(msg.payload, Bytes::from(i.to_be_bytes().to_vec()));
        }
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn bounded_buffer_rejects_overflow() {
        let bus = LocalBus::with_config(BusConfig::new().with_capacity(2));
        let mut slow = bus.subscribe("t");
        let mut fast = bus.subscribe("t");

        bus.publish("t", Bytes::from_static(b"1")).unwrap();
        bus.publish("t", Bytes::from_static(b"2")).unwrap();
        assert_eq!(fast.recv().await.unwrap().payload, Bytes::from_static(b"1"));

        assert!(matches!(
            bus.publish("t", Bytes::from_static(b"3")),
            Err(BusError::Full { capacity: 2, .. })
        ));

        assert_eq!(slow.recv().await.unwrap().payload, Bytes::from_static(b"1"));
        bus.publish("t", Bytes::from_static(b"3")).unwrap();
        assert_eq!(fast.recv().await.unwrap().payload, Bytes::from_static(b"2"));
        assert_eq!(fast.recv().await.unwrap().payload, Bytes::from_static(b"3"));
        assert_eq!(slow.recv().await.unwrap().payload, Bytes::from_static(b"2"));
        assert_eq!(slow.recv().await.unwrap().payload, Bytes::from_static(b"3"));
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let bus = LocalBus::with_config(BusConfig::new().with_capacity(1));
        let gone = bus.subscribe("t");
        drop(gone);
        assert_eq!(bus.subscriber_count("t"), 0);
        bus.publish("t", Bytes::new()).unwrap();
        bus.publish("t", Bytes::new()).unwrap();
    }
}
