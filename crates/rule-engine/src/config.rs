//! Engine configuration
//!
//! Everything the rule set needs to know about the installation. Durations
//! are whole seconds so the structure reads naturally from JSON or the
//! environment.

use crate::keys;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of one reminder that nags while a proposition stays true
///
/// Used for doors left open and for sensors reporting a low battery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DoorReminderConfig {
    /// Controller name
    pub name: String,
    /// Proposition that is true while the condition holds
    pub key: String,
    /// How long the condition may hold before reminders start
    pub open_long_limit_secs: u64,
    /// Topic the reminder is published on
    pub topic: String,
    pub message: String,
    pub period_secs: u64,
    pub max_reminders: u32,
}

impl DoorReminderConfig {
    #[must_use]
    pub fn open_long_limit(&self) -> Duration {
        Duration::from_secs(self.open_long_limit_secs)
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// Bedroom blinds schedule (cron expressions, local time)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BlindsConfig {
    pub device: String,
    pub open: String,
    pub close: String,
    pub refresh: Vec<String>,
}

impl Default for BlindsConfig {
    fn default() -> Self {
        Self {
            device: "bedroom-blinds".to_string(),
            open: "0 0 9 * * *".to_string(),
            close: "0 0 21 * * *".to_string(),
            refresh: vec!["0 0 8 * * *".to_string(), "0 0 20 * * *".to_string()],
        }
    }
}

/// Configuration consumed by the rule set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Phone MAC addresses, normalised, that count as someone being home
    pub phone_macs: Vec<String>,
    pub ticker_interval_secs: u64,
    /// Sink name of the kitchen's own sound card
    pub kitchen_local_sink: String,
    /// Sink that streams to the rest of the house
    pub kitchen_remote_sink: String,
    pub presence_threshold: f64,
    pub door_reminders: Vec<DoorReminderConfig>,
    pub blinds: BlindsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            latitude: 59.3293,
            longitude: 18.0686,
            phone_macs: Vec::new(),
            ticker_interval_secs: 60,
            kitchen_local_sink: "alsa_output.platform-soc_sound.stereo-fallback".to_string(),
            kitchen_remote_sink: "snapcast".to_string(),
            presence_threshold: 0.9,
            door_reminders: vec![
                DoorReminderConfig {
                    name: "freezer door".to_string(),
                    key: keys::FREEZER_DOOR_OPEN.to_string(),
                    open_long_limit_secs: 120,
                    topic: keys::topics::TELEGRAM_SEND.to_string(),
                    message: "The freezer door is open".to_string(),
                    period_secs: 300,
                    max_reminders: 5,
                },
                DoorReminderConfig {
                    name: "freezer battery".to_string(),
                    key: keys::FREEZER_DOOR_BATTERY_LOW.to_string(),
                    open_long_limit_secs: 60,
                    topic: keys::topics::TELEGRAM_SEND.to_string(),
                    message: "The freezer door sensor battery is low".to_string(),
                    period_secs: 12 * 60 * 60,
                    max_reminders: 3,
                },
            ],
            blinds: BlindsConfig::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn ticker_interval(&self) -> Duration {
        Duration::from_secs(self.ticker_interval_secs.max(1))
    }
}
