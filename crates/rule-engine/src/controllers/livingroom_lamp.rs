//! Living-room floor lamp: on at night while someone is around

use crate::controller::{ControllerContext, MachineController};
use crate::keys::{self, topics};
use crate::machine::StateMachine;
use bus_protocol::Publication;
use chrono::Duration;
use observation_store::StateValueMap;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LampState {
    On,
    Off,
}

fn lamp_wanted(store: &StateValueMap) -> bool {
    store.currently_true(keys::PHONE_PRESENT)
        && store.currently_true(keys::NIGHTTIME)
        && store.recently_true(keys::LIVINGROOM_PRESENCE, Duration::minutes(10))
}

fn set_lamp(state: &str) -> Publication {
    Publication::command(topics::LIVINGROOM_FLOORLAMP_SET, &json!({ "state": state }))
}

#[must_use]
pub fn livingroom_lamp(ctx: &ControllerContext) -> MachineController<LampState> {
    let mut machine = StateMachine::new("livingroom lamp", ctx.store.clone());
    machine
        .permit(LampState::Off, LampState::On, lamp_wanted)
        .permit(LampState::On, LampState::Off, |s| !lamp_wanted(s))
        .on_entry(LampState::On, |_| Ok(vec![set_lamp("ON")]))
        .on_entry(LampState::Off, |_| Ok(vec![set_lamp("OFF")]));
    MachineController::starting_in(machine, LampState::Off)
}
