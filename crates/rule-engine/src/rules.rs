//! The installation's rule set
//!
//! Which topics become which propositions, how `atHome` is inferred, and
//! which controllers run. [`build`] wires all of it into a [`Master`].

use crate::config::EngineConfig;
use crate::controller::{Controller, ControllerContext};
use crate::controllers;
use crate::error::EngineError;
use crate::keys::{self, topics};
use crate::master::Master;
use bus_protocol::TimeOfDay;
use chrono::Duration;
use observation_store::cec::CecExtractor;
use observation_store::wifi::{normalize_mac, WifiPresence};
use observation_store::{
    BayesianEngine, BayesianModel, Evaluator, Extractor, Gauges, JsonBool, JsonNumeric,
    JsonThreshold, Likelihood, RawEnum, StateValueMap, TimeOfDayPhase,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const TWILIGHT_PHASES: [TimeOfDay; 6] = [
    TimeOfDay::MorningAstronomicalTwilight,
    TimeOfDay::MorningNauticalTwilight,
    TimeOfDay::MorningCivilTwilight,
    TimeOfDay::EveningCivilTwilight,
    TimeOfDay::EveningNauticalTwilight,
    TimeOfDay::EveningAstronomicalTwilight,
];

/// Extractors in the order they run
pub fn extractors(
    config: &EngineConfig,
    gauges: &Arc<Gauges>,
) -> Result<Vec<Box<dyn Extractor>>, EngineError> {
    let macs = config
        .phone_macs
        .iter()
        .map(|mac| {
            normalize_mac(mac)
                .ok_or_else(|| EngineError::InvalidConfig(format!("invalid MAC address {mac}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let list: Vec<Box<dyn Extractor>> = vec![
        // Time of day
        Box::new(TimeOfDayPhase::new(topics::TIME_OF_DAY, &[TimeOfDay::Nighttime], keys::NIGHTTIME)),
        Box::new(TimeOfDayPhase::new(topics::TIME_OF_DAY, &[TimeOfDay::Daytime], keys::DAYTIME)),
        Box::new(TimeOfDayPhase::new(topics::TIME_OF_DAY, &TWILIGHT_PHASES, keys::TWILIGHT)),
        // Presence
        Box::new(WifiPresence::new(topics::WIFI_CLIENTS, macs, keys::PHONE_PRESENT)),
        Box::new(JsonBool::new(topics::LIVINGROOM_PRESENCE, "occupancy", true, keys::LIVINGROOM_PRESENCE)),
        Box::new(JsonBool::new(topics::HALLWAY_PRESENCE, "occupancy", true, keys::HALLWAY_PRESENCE)),
        Box::new(JsonBool::new(topics::KITCHEN_PRESENCE, "occupancy", true, keys::KITCHEN_PRESENCE)),
        Box::new(JsonNumeric::new(
            topics::LIVINGROOM_PRESENCE,
            "illuminance_lux",
            "livingroom_illuminance_lux",
            gauges.clone(),
        )),
        // Lights and doors
        Box::new(JsonBool::new(topics::LIVINGROOM_FLOORLAMP, "state", "ON", keys::LIVINGROOM_FLOORLAMP_ON)),
        Box::new(JsonBool::new(topics::FREEZER_DOOR, "contact", false, keys::FREEZER_DOOR_OPEN)),
        Box::new(JsonThreshold::new(topics::FREEZER_DOOR, "battery", 20.0, keys::FREEZER_DOOR_BATTERY_LOW)),
        Box::new(JsonNumeric::new(topics::FREEZER_DOOR, "battery", "freezer_door_battery", gauges.clone())),
        Box::new(JsonBool::new(topics::BALCONY_DOOR, "contact", false, keys::BALCONY_DOOR_OPEN)),
        Box::new(JsonNumeric::new(
            topics::BALCONY_CLIMATE,
            "temperature",
            "balcony_temperature",
            gauges.clone(),
        )),
        // Media
        Box::new(CecExtractor::new()),
        Box::new(JsonBool::new(topics::MPD_STATUS, "state", "play", keys::MPD_PLAY)),
        Box::new(JsonBool::new(topics::ROTEL_STATE, "power", "on", keys::ROTEL_POWER)),
        Box::new(JsonBool::new(topics::ROTEL_STATE, "source", "opt1", keys::ROTEL_SOURCE_TV)),
        Box::new(RawEnum::new(topics::SNAPCAST_KITCHEN_STATUS, "playing", keys::KITCHEN_AUDIO_PLAYING)),
        Box::new(JsonBool::new(
            topics::MEDIA_REMOTE_KITCHEN,
            "action",
            "dots_2_long_press",
            keys::KITCHEN_REMOTE_LOCAL,
        )),
        Box::new(JsonBool::new(
            topics::MEDIA_REMOTE_KITCHEN,
            "action",
            "dots_1_long_press",
            keys::KITCHEN_REMOTE_REMOTE,
        )),
    ];
    Ok(list)
}

/// Model for `atHome`
#[must_use]
pub fn at_home_model(threshold: f64) -> BayesianModel {
    let half_hour = Duration::minutes(30);
    BayesianModel::new(0.5, threshold)
        .likelihood(
            keys::FREEZER_DOOR_OPEN,
            Likelihood::new(0.95, 0.05).with_half_life(half_hour),
        )
        .likelihood(keys::PHONE_PRESENT, Likelihood::new(0.9, 0.2))
        .likelihood(
            keys::LIVINGROOM_PRESENCE,
            Likelihood::new(0.9, 0.1)
                .with_half_life(half_hour)
                .with_evaluator(Evaluator::RecentlyTrue(Duration::minutes(10))),
        )
        .likelihood(
            keys::KITCHEN_PRESENCE,
            Likelihood::new(0.85, 0.1).with_half_life(half_hour),
        )
        .likelihood(
            keys::HALLWAY_PRESENCE,
            Likelihood::new(0.85, 0.1).with_half_life(half_hour),
        )
        .likelihood(
            keys::TV_POWER,
            Likelihood::new(0.9, 0.1)
                .with_half_life(Duration::hours(2))
                .with_evaluator(Evaluator::TrueSinceSet),
        )
        .likelihood(
            keys::MPD_PLAY,
            Likelihood::new(0.7, 0.3).with_weight(0.5),
        )
}

#[must_use]
pub fn bayesian_engine(store: Arc<StateValueMap>, config: &EngineConfig) -> BayesianEngine {
    let mut engine = BayesianEngine::new(store);
    engine.register_model(keys::AT_HOME, at_home_model(config.presence_threshold));
    engine
}

/// Every controller of the installation
pub fn controllers(
    ctx: &ControllerContext,
    config: &EngineConfig,
) -> Result<Vec<Box<dyn Controller>>, EngineError> {
    let mut list: Vec<Box<dyn Controller>> = vec![
        Box::new(controllers::livingroom_lamp(ctx)),
        Box::new(controllers::tv(ctx)),
        Box::new(controllers::kitchen_audio(
            ctx,
            &config.kitchen_local_sink,
            &config.kitchen_remote_sink,
        )),
        Box::new(controllers::presence(ctx)),
        Box::new(controllers::BedroomBlinds::new(ctx, &config.blinds)?),
    ];
    for reminder in &config.door_reminders {
        list.push(Box::new(controllers::door_reminder(ctx, reminder)));
    }
    Ok(list)
}

/// Build the dispatcher for the whole installation
///
/// Spawns the controller workers, so it must run inside a tokio runtime.
pub fn build(
    config: &EngineConfig,
    store: Arc<StateValueMap>,
    gauges: &Arc<Gauges>,
    shutdown: CancellationToken,
) -> Result<Arc<Master>, EngineError> {
    let bayesian = bayesian_engine(store.clone(), config);
    let builder = Master::builder(store, bayesian, shutdown).extractors(extractors(config, gauges)?);
    let controllers = controllers(builder.context(), config)?;
    Ok(builder.controllers(controllers).build())
}
