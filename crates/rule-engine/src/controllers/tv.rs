//! Living-room TV: follows the CEC power state and drives the amplifier

use crate::controller::{ControllerContext, MachineController};
use crate::keys::{self, topics};
use crate::machine::StateMachine;
use bus_protocol::{Publication, QoS};
use chrono::Duration;
use serde_json::json;

/// Delay between powering the amplifier and selecting its input
pub const SOURCE_SWITCH_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvState {
    On,
    Off,
    /// Off for a long time; pollers may back off
    OffLong,
}

fn rotel(command: &str) -> Publication {
    Publication::new(topics::ROTEL_COMMAND, command.to_string()).with_qos(QoS::ExactlyOnce)
}

fn tv_on_bundle() -> Vec<Publication> {
    vec![
        rotel("power_on!"),
        rotel("opt1!").with_wait(SOURCE_SWITCH_DELAY),
        Publication::command(topics::TV_LIGHT_SET, &json!({ "state": "ON" })),
    ]
}

#[must_use]
pub fn tv(ctx: &ControllerContext) -> MachineController<TvState> {
    let store = ctx.store.clone();
    let mut machine = StateMachine::new("tv", ctx.store.clone());
    machine
        .permit(TvState::Off, TvState::On, |s| s.currently_true(keys::TV_POWER))
        .permit(TvState::Off, TvState::OffLong, |s| {
            s.require_false_since(keys::TV_POWER, Duration::minutes(30))
        })
        .permit(TvState::OffLong, TvState::On, |s| s.currently_true(keys::TV_POWER))
        .permit(TvState::On, TvState::Off, |s| s.currently_false(keys::TV_POWER))
        .on_entry(TvState::On, |_| Ok(tv_on_bundle()))
        .on_entry(TvState::Off, move |_| {
            let mut out = vec![Publication::command(
                topics::TV_LIGHT_SET,
                &json!({ "state": "OFF" }),
            )];
            if store.currently_true(keys::MPD_PLAY) {
                tracing::info!("tv: music is playing, leaving the amplifier on");
            } else {
                out.push(rotel("power_off!"));
            }
            Ok(out)
        });
    MachineController::starting_in(machine, TvState::Off)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Controller;
    use crate::controllers::tests::context;
    use bus_protocol::BusEvent;
    use observation_store::ManualClock;
    use std::sync::Arc;

    fn topics_of(out: &[Publication]) -> Vec<(String, String)> {
        out.iter()
            .map(|p| (p.topic.clone(), p.payload_text()))
            .collect()
    }

    #[test]
    fn test_power_cycle() {
        let clock = Arc::new(ManualClock::default());
        let (ctx, _rx) = context(clock.clone());
        let mut tv = tv(&ctx);
        let event = BusEvent::new("cec/message/hex/rx", "01:90:00");
        tv.initialize();

        ctx.store.set(keys::TV_POWER, true);
        let out = tv.process_event(&event);
        assert_eq!(tv.machine().state(), Some(TvState::On));
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].payload_text(), "power_on!");
        assert!(out[0].wait.is_zero());
        assert_eq!(out[1].payload_text(), "opt1!");
        assert_eq!(out[1].wait, SOURCE_SWITCH_DELAY);
        assert_eq!(out[2].topic, topics::TV_LIGHT_SET);

        ctx.store.set(keys::TV_POWER, false);
        let out = tv.process_event(&event);
        assert_eq!(tv.machine().state(), Some(TvState::Off));
        assert_eq!(
            topics_of(&out),
            vec![
                (topics::TV_LIGHT_SET.to_string(), r#"{"state":"OFF"}"#.to_string()),
                (topics::ROTEL_COMMAND.to_string(), "power_off!".to_string()),
            ]
        );

        clock.advance(Duration::minutes(31));
        assert!(tv.process_event(&event).is_empty());
        assert_eq!(tv.machine().state(), Some(TvState::OffLong));

        ctx.store.set(keys::TV_POWER, true);
        assert_eq!(tv.process_event(&event).len(), 3);
        assert_eq!(tv.machine().state(), Some(TvState::On));
    }

    #[test]
    fn test_amplifier_stays_on_for_music() {
        let (ctx, _rx) = context(Arc::new(ManualClock::default()));
        let mut tv = tv(&ctx);
        let event = BusEvent::new("any", "x");
        tv.initialize();
        ctx.store.set(keys::TV_POWER, true);
        tv.process_event(&event);

        ctx.store.set(keys::MPD_PLAY, true);
        ctx.store.set(keys::TV_POWER, false);
        let out = tv.process_event(&event);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic, topics::TV_LIGHT_SET);
    }
}
