//! The message bus seam and its in-process implementation

use crate::error::BusError;
use crate::event::{BusEvent, Payload};
use crate::publication::Publication;
use crate::topic::{validate_topic, TopicFilter};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default channel capacity for bus subscriptions
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A publish/subscribe bus
///
/// Publishing hands the message to the client and returns without waiting
/// for delivery. Implementations must be safe to share between tasks.
pub trait MessageBus: Send + Sync {
    /// Hand a publication to the bus client
    fn publish(&self, publication: &Publication) -> Result<(), BusError>;

    /// Subscribe to every topic matching `filter`
    ///
    /// Retained messages matching the filter are delivered first.
    fn subscribe(&self, filter: &str) -> Result<Subscription, BusError>;
}

/// A live subscription to the bus
pub struct Subscription {
    filter: TopicFilter,
    backlog: VecDeque<Arc<BusEvent>>,
    rx: broadcast::Receiver<Arc<BusEvent>>,
}

impl Subscription {
    /// Create a subscription from a receiver and the retained messages to replay
    #[must_use]
    pub fn new(
        filter: TopicFilter,
        retained: Vec<Arc<BusEvent>>,
        rx: broadcast::Receiver<Arc<BusEvent>>,
    ) -> Self {
        Self {
            filter,
            backlog: retained.into(),
            rx,
        }
    }

    #[must_use]
    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<Arc<BusEvent>, BusError> {
        if let Some(event) = self.backlog.pop_front() {
            return Ok(event);
        }

        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event.topic) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        "Subscription '{}' lagged by {} events",
                        self.filter.as_str(),
                        n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }
}

/// In-process bus with retained-message support
///
/// Every publication is turned into a `BusEvent` and broadcast to all
/// subscribers, the publisher included. Retained publications are kept per
/// topic and replayed to new subscribers; an empty retained payload clears
/// the topic.
pub struct LocalBus {
    event_tx: broadcast::Sender<Arc<BusEvent>>,
    retained: DashMap<String, Arc<BusEvent>>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self {
            event_tx,
            retained: DashMap::new(),
        }
    }

    /// Number of topics with a retained message
    #[must_use]
    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    /// Latest retained message on a topic
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<Arc<BusEvent>> {
        self.retained.get(topic).map(|r| Arc::clone(r.value()))
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, publication: &Publication) -> Result<(), BusError> {
        validate_topic(&publication.topic)?;

        let event = Arc::new(BusEvent::new(
            publication.topic.clone(),
            Payload::Raw(publication.payload.clone()),
        ));

        if publication.retained {
            if publication.payload.is_empty() {
                self.retained.remove(&publication.topic);
            } else {
                self.retained
                    .insert(publication.topic.clone(), Arc::clone(&event));
            }
        }

        tracing::trace!("Bus publish: {}", publication);

        // No receivers is not an error on a best-effort bus
        let _ = self.event_tx.send(event);
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> Result<Subscription, BusError> {
        let filter = TopicFilter::new(filter)?;
        // Subscribe before snapshotting so nothing published in between is lost
        let rx = self.event_tx.subscribe();

        let mut retained: Vec<Arc<BusEvent>> = self
            .retained
            .iter()
            .filter(|r| filter.matches(r.key()))
            .map(|r| Arc::clone(r.value()))
            .collect();
        retained.sort_by_key(|e| e.timestamp);

        tracing::debug!(
            "New subscription '{}' ({} retained messages)",
            filter.as_str(),
            retained.len()
        );
        Ok(Subscription::new(filter, retained, rx))
    }
}

/// Bus decorator that logs publications instead of sending them
pub struct DryRunBus<B> {
    inner: B,
}

impl<B: MessageBus> DryRunBus<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<B: MessageBus> MessageBus for DryRunBus<B> {
    fn publish(&self, publication: &Publication) -> Result<(), BusError> {
        validate_topic(&publication.topic)?;
        tracing::info!("[dry-run] would publish {}", publication);
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> Result<Subscription, BusError> {
        self.inner.subscribe(filter)
    }
}

impl<T: MessageBus + ?Sized> MessageBus for Arc<T> {
    fn publish(&self, publication: &Publication) -> Result<(), BusError> {
        (**self).publish(publication)
    }

    fn subscribe(&self, filter: &str) -> Result<Subscription, BusError> {
        (**self).subscribe(filter)
    }
}
