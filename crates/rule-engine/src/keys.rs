//! Proposition keys and bus topics known to the engine

pub use observation_store::cec::{
    SOURCE_PLAYBACK_1 as CEC_SOURCE_PLAYBACK_1, SOURCE_PLAYBACK_2 as CEC_SOURCE_PLAYBACK_2,
    SOURCE_RECORDER as CEC_SOURCE_RECORDER, SOURCE_TV as CEC_SOURCE_TV, TV_POWER,
};

pub const PHONE_PRESENT: &str = "phonePresent";
pub const NIGHTTIME: &str = "nighttime";
pub const DAYTIME: &str = "daytime";
pub const TWILIGHT: &str = "twilight";

pub const LIVINGROOM_PRESENCE: &str = "livingroomPresence";
pub const HALLWAY_PRESENCE: &str = "hallwayPresence";
pub const KITCHEN_PRESENCE: &str = "kitchenPresence";
pub const LIVINGROOM_FLOORLAMP_ON: &str = "livingroomFloorlampOn";

pub const MPD_PLAY: &str = "mpdPlay";
pub const KITCHEN_AUDIO_PLAYING: &str = "kitchenAudioPlaying";
pub const ROTEL_POWER: &str = "rotelPower";
pub const ROTEL_SOURCE_TV: &str = "rotelSourceTv";

pub const FREEZER_DOOR_OPEN: &str = "freezerDoorOpen";
pub const FREEZER_DOOR_BATTERY_LOW: &str = "freezerDoorBatteryLow";
pub const BALCONY_DOOR_OPEN: &str = "balconyDoorOpen";

pub const KITCHEN_REMOTE_LOCAL: &str = "kitchenRemoteLocal";
pub const KITCHEN_REMOTE_REMOTE: &str = "kitchenRemoteRemote";

/// Derived by the presence model
pub const AT_HOME: &str = "atHome";

pub mod topics {
    pub const TIME_OF_DAY: &str = "regelverk/ticker/timeofday";
    pub const WIFI_CLIENTS: &str = "routeros/wificlients";

    pub const LIVINGROOM_PRESENCE: &str = "zigbee2mqtt/livingroom-presence";
    pub const HALLWAY_PRESENCE: &str = "zigbee2mqtt/hallway-presence";
    pub const KITCHEN_PRESENCE: &str = "zigbee2mqtt/kitchen-presence";
    pub const LIVINGROOM_FLOORLAMP: &str = "zigbee2mqtt/livingroom-floorlamp";
    pub const LIVINGROOM_FLOORLAMP_SET: &str = "zigbee2mqtt/livingroom-floorlamp/set";
    pub const TV_LIGHT_SET: &str = "zigbee2mqtt/livingroom-tv-light/set";
    pub const FREEZER_DOOR: &str = "zigbee2mqtt/freezer-door";
    pub const BALCONY_DOOR: &str = "zigbee2mqtt/balcony-door";
    pub const BEDROOM_BLINDS: &str = "zigbee2mqtt/bedroom-blinds";
    pub const MEDIA_REMOTE_KITCHEN: &str = "zigbee2mqtt/media_remote_kitchen";
    pub const BALCONY_CLIMATE: &str = "zigbee2mqtt/balcony-climate";

    pub const MPD_STATUS: &str = "mpd/status";
    pub const ROTEL_STATE: &str = "rotel/state";
    pub const ROTEL_COMMAND: &str = "rotel/command/send";
    pub const KITCHEN_PULSEAUDIO_STATE: &str = "kitchen/pulseaudio/state";
    pub const KITCHEN_PULSEAUDIO_COMMAND: &str = "kitchen/pulseaudio/cmnd";
    pub const KITCHEN_AMPLIFIER_COMMAND: &str = "kitchen/amplifier/cmnd";
    pub const SNAPCAST_KITCHEN_STATUS: &str = "snapcast/stream/kitchen/status";
    pub const TELEGRAM_SEND: &str = "telegram/message/send";
}
