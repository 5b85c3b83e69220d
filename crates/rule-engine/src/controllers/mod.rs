//! The controllers of the installation

pub mod bedroom_blinds;
pub mod door_reminder;
pub mod kitchen_audio;
pub mod livingroom_lamp;
pub mod presence;
pub mod tv;

pub use bedroom_blinds::BedroomBlinds;
pub use door_reminder::{door_reminder, DoorState};
pub use kitchen_audio::{kitchen_audio, AudioGraph, KitchenAudioState};
pub use livingroom_lamp::{livingroom_lamp, LampState};
pub use presence::{presence, PresenceState};
pub use tv::{tv, TvState};

#[cfg(test)]
pub(crate) mod tests {
    use crate::controller::{ControllerContext, PublicationSink};
    use bus_protocol::Publication;
    use observation_store::{BayesianEngine, ManualClock, StateValueMap};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    pub(crate) fn context(
        clock: Arc<ManualClock>,
    ) -> (ControllerContext, mpsc::UnboundedReceiver<Publication>) {
        let store = Arc::new(StateValueMap::new(clock));
        let bayesian = Arc::new(BayesianEngine::new(store.clone()));
        let (sink, rx) = PublicationSink::channel();
        let ctx = ControllerContext {
            store,
            bayesian,
            sink,
            shutdown: CancellationToken::new(),
        };
        (ctx, rx)
    }
}
