//! Periodic time-of-day events

use crate::keys::topics;
use crate::sun::{current_phase, Observer};
use bus_protocol::{BusEvent, Payload};
use observation_store::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Injects `regelverk/ticker/timeofday` at a fixed period
pub struct Ticker {
    injector: mpsc::UnboundedSender<BusEvent>,
    clock: Arc<dyn Clock>,
    observer: Observer,
    period: Duration,
}

impl Ticker {
    #[must_use]
    pub fn new(
        injector: mpsc::UnboundedSender<BusEvent>,
        clock: Arc<dyn Clock>,
        observer: Observer,
        period: Duration,
    ) -> Self {
        Self {
            injector,
            clock,
            observer,
            period,
        }
    }

    /// Run on a background task until `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Emit one event immediately, then one per period
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Time-of-day ticker started ({:?} period)", self.period);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let now = self.clock.now();
                    let phase = current_phase(now, self.observer);
                    tracing::trace!("Tick: {}", phase);
                    let event = BusEvent::at(now, topics::TIME_OF_DAY, Payload::TimeOfDay(phase));
                    if self.injector.send(event).is_err() {
                        tracing::debug!("Dispatcher gone, stopping ticker");
                        break;
                    }
                }
            }
        }
        tracing::info!("Time-of-day ticker stopped");
    }
}
