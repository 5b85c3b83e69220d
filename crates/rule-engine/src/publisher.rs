//! Hands publications to the bus, honouring per-publication delays

use bus_protocol::{MessageBus, Publication};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sends publications to the bus
///
/// Zero-wait publications go out immediately and in order. Delayed ones
/// each get their own timer task, so delays within a batch overlap and
/// publications with equal delays are unordered.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<dyn MessageBus>,
    shutdown: CancellationToken,
}

impl Publisher {
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, shutdown: CancellationToken) -> Self {
        Self { bus, shutdown }
    }

    /// Emit a batch returned by one controller
    pub fn emit_all(&self, publications: Vec<Publication>) {
        for publication in publications {
            self.emit(publication);
        }
    }

    /// Emit one publication now or after its `wait`
    ///
    /// Delayed publications need a tokio runtime.
    pub fn emit(&self, publication: Publication) {
        if publication.wait.is_zero() {
            send(self.bus.as_ref(), &publication);
            return;
        }

        let bus = Arc::clone(&self.bus);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Dropping delayed publication on {}: shutting down", publication.topic);
                }
                _ = tokio::time::sleep(publication.wait) => send(bus.as_ref(), &publication),
            }
        });
    }
}

fn send(bus: &dyn MessageBus, publication: &Publication) {
    match bus.publish(publication) {
        Ok(()) => tracing::debug!("Published {}", publication),
        Err(e) => tracing::error!("Failed to publish on {}: {}", publication.topic, e),
    }
}
