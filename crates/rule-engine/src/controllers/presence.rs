//! Home/away tracking from the `atHome` belief

use crate::controller::{ControllerContext, MachineController};
use crate::keys;
use crate::machine::StateMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Away,
    Home,
}

/// Re-evaluates `atHome` on every event so the belief decays even when its
/// inputs are quiet
#[must_use]
pub fn presence(ctx: &ControllerContext) -> MachineController<PresenceState> {
    let mut machine = StateMachine::new("presence", ctx.store.clone());
    machine
        .permit(PresenceState::Away, PresenceState::Home, |s| {
            s.currently_true(keys::AT_HOME)
        })
        .permit(PresenceState::Home, PresenceState::Away, |s| {
            s.currently_false(keys::AT_HOME)
        });

    let bayesian = ctx.bayesian.clone();
    let mut controller = MachineController::starting_in(machine, PresenceState::Away);
    controller.add_handler(move |_event, _outbox| {
        if let Some(inference) = bayesian.reinfer(keys::AT_HOME) {
            tracing::trace!("atHome p={:.3}", inference.probability);
        }
    });
    controller
}
