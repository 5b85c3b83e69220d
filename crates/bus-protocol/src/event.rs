//! Bus events and their payloads

use crate::error::PayloadError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Phase of the day, derived from the sun's elevation at the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeOfDay {
    Nighttime,
    MorningAstronomicalTwilight,
    MorningNauticalTwilight,
    MorningCivilTwilight,
    Daytime,
    EveningCivilTwilight,
    EveningNauticalTwilight,
    EveningAstronomicalTwilight,
}

impl TimeOfDay {
    /// All phases in their daily order, starting after midnight
    pub const ALL: [TimeOfDay; 8] = [
        TimeOfDay::Nighttime,
        TimeOfDay::MorningAstronomicalTwilight,
        TimeOfDay::MorningNauticalTwilight,
        TimeOfDay::MorningCivilTwilight,
        TimeOfDay::Daytime,
        TimeOfDay::EveningCivilTwilight,
        TimeOfDay::EveningNauticalTwilight,
        TimeOfDay::EveningAstronomicalTwilight,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Nighttime => "Nighttime",
            TimeOfDay::MorningAstronomicalTwilight => "MorningAstronomicalTwilight",
            TimeOfDay::MorningNauticalTwilight => "MorningNauticalTwilight",
            TimeOfDay::MorningCivilTwilight => "MorningCivilTwilight",
            TimeOfDay::Daytime => "Daytime",
            TimeOfDay::EveningCivilTwilight => "EveningCivilTwilight",
            TimeOfDay::EveningNauticalTwilight => "EveningNauticalTwilight",
            TimeOfDay::EveningAstronomicalTwilight => "EveningAstronomicalTwilight",
        }
    }

    /// Whether this is one of the six twilight phases
    #[must_use]
    pub fn is_twilight(&self) -> bool {
        !matches!(self, TimeOfDay::Nighttime | TimeOfDay::Daytime)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeOfDay {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        TimeOfDay::ALL
            .into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PayloadError::UnknownTimeOfDay(s.to_string()))
    }
}

/// Event payload
///
/// Payloads arriving from the wire are raw bytes and are decoded on demand.
/// Synthetic sources inside the engine hand over already-typed values.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(Bytes),
    Json(serde_json::Value),
    TimeOfDay(TimeOfDay),
}

impl Payload {
    /// Interpret the payload as a JSON document
    pub fn json(&self) -> Result<Cow<'_, serde_json::Value>, PayloadError> {
        match self {
            Payload::Json(value) => Ok(Cow::Borrowed(value)),
            Payload::Raw(bytes) => Ok(Cow::Owned(serde_json::from_slice(bytes)?)),
            Payload::TimeOfDay(tod) => Ok(Cow::Owned(serde_json::Value::String(
                tod.as_str().to_string(),
            ))),
        }
    }

    /// Interpret the payload as UTF-8 text
    pub fn text(&self) -> Result<Cow<'_, str>, PayloadError> {
        match self {
            Payload::Raw(bytes) => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| PayloadError::NotText),
            Payload::Json(serde_json::Value::String(s)) => Ok(Cow::Borrowed(s.as_str())),
            Payload::Json(value) => Ok(Cow::Owned(value.to_string())),
            Payload::TimeOfDay(tod) => Ok(Cow::Borrowed(tod.as_str())),
        }
    }

    /// Interpret the payload as a time-of-day phase
    pub fn time_of_day(&self) -> Result<TimeOfDay, PayloadError> {
        match self {
            Payload::TimeOfDay(tod) => Ok(*tod),
            other => other.text()?.parse(),
        }
    }

    /// Wire representation of the payload
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Payload::Raw(bytes) => bytes.clone(),
            Payload::Json(value) => Bytes::from(value.to_string()),
            Payload::TimeOfDay(tod) => Bytes::from_static(tod.as_str().as_bytes()),
        }
    }

    /// Lossy text rendering, for logs and the websocket feed
    #[must_use]
    pub fn to_text_lossy(&self) -> String {
        match self {
            Payload::Raw(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Payload::Json(value) => value.to_string(),
            Payload::TimeOfDay(tod) => tod.to_string(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Raw(bytes) if bytes.is_empty())
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Raw(bytes)
    }
}

impl From<&'static str> for Payload {
    fn from(s: &'static str) -> Self {
        Payload::Raw(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Raw(Bytes::from(s))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

impl From<TimeOfDay> for Payload {
    fn from(tod: TimeOfDay) -> Self {
        Payload::TimeOfDay(tod)
    }
}

/// A message received from the bus (or injected by a synthetic source)
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub payload: Payload,
}

impl BusEvent {
    /// Create an event stamped with the current time
    pub fn new(topic: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            timestamp: Utc::now(),
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Create an event with an explicit timestamp
    pub fn at(
        timestamp: DateTime<Utc>,
        topic: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Self {
        Self {
            timestamp,
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}
