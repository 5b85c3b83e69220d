//! Reminders for doors left open

use crate::config::DoorReminderConfig;
use crate::controller::{ControllerContext, MachineController, PublicationSink};
use crate::machine::StateMachine;
use crate::task::TaskSlot;
use bus_protocol::{Publication, QoS};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Closed,
    Open,
    /// Open for longer than the configured limit; reminders are running
    OpenLong,
}

/// Publish `reminder` up to `max` times, the first right away
async fn remind(
    sink: PublicationSink,
    reminder: Publication,
    period: Duration,
    max: u32,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
    for sent in 1..=max {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = interval.tick() => {
                tracing::info!("Reminder {}/{} on {}", sent, max, reminder.topic);
                if !sink.publish(reminder.clone()) {
                    return;
                }
            }
        }
    }
    tracing::debug!("Reminder limit reached on {}", reminder.topic);
}

#[must_use]
pub fn door_reminder(
    ctx: &ControllerContext,
    config: &DoorReminderConfig,
) -> MachineController<DoorState> {
    let limit = chrono::Duration::from_std(config.open_long_limit())
        .unwrap_or_else(|_| chrono::Duration::weeks(52));
    let slot = Arc::new(Mutex::new(TaskSlot::new(
        format!("{} reminder", config.name),
        ctx.shutdown.clone(),
    )));
    let reminder = Publication::new(config.topic.clone(), config.message.clone())
        .with_qos(QoS::AtLeastOnce);

    let mut machine = StateMachine::new(config.name.clone(), ctx.store.clone());
    let (open, long, closed_from_open, closed_from_long) = (
        config.key.clone(),
        config.key.clone(),
        config.key.clone(),
        config.key.clone(),
    );
    machine
        .permit(DoorState::Closed, DoorState::Open, move |s| s.currently_true(&open))
        .permit(DoorState::Open, DoorState::Closed, move |s| {
            s.currently_false(&closed_from_open)
        })
        .permit(DoorState::Open, DoorState::OpenLong, move |s| {
            s.require_true_since(&long, limit)
        })
        .permit(DoorState::OpenLong, DoorState::Closed, move |s| {
            s.currently_false(&closed_from_long)
        });

    let (start, sink, period, max) = (
        slot.clone(),
        ctx.sink.clone(),
        config.period(),
        config.max_reminders,
    );
    machine.on_entry(DoorState::OpenLong, move |_| {
        let (sink, reminder) = (sink.clone(), reminder.clone());
        start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start(move |token| remind(sink, reminder, period, max, token));
        Ok(Vec::new())
    });
    machine.on_exit(DoorState::OpenLong, move |_| {
        slot.lock().unwrap_or_else(PoisonError::into_inner).cancel();
        Ok(Vec::new())
    });

    MachineController::starting_in(machine, DoorState::Closed)
}
