//! Publication requests emitted by the engine

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Delivery guarantee requested from the bus client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(format!("invalid QoS level {value}")),
        }
    }
}

/// A message the engine intends to send, optionally after a delay
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retained: bool,
    /// Delay before the publication is handed to the bus client
    pub wait: Duration,
}

impl Publication {
    /// Create a fire-and-forget publication (QoS 0, not retained, no delay)
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retained: false,
            wait: Duration::ZERO,
        }
    }

    /// Create a publication carrying a JSON document
    pub fn json(topic: impl Into<String>, value: &serde_json::Value) -> Self {
        Self::new(topic, value.to_string())
    }

    /// State-affecting command: QoS 2, retained
    pub fn command(topic: impl Into<String>, value: &serde_json::Value) -> Self {
        Self::json(topic, value)
            .with_qos(QoS::ExactlyOnce)
            .with_retained(true)
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retained(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }

    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Payload rendered as text for logging
    #[must_use]
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl fmt::Display for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <- {} (qos={}, retained={}, wait={:?})",
            self.topic,
            self.payload_text(),
            u8::from(self.qos),
            self.retained,
            self.wait
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_defaults() {
        let p = Publication::command("zigbee2mqtt/lamp/set", &json!({"state": "ON"}));
        assert_eq!(p.qos, QoS::ExactlyOnce);
        assert!(p.retained);
        assert_eq!(p.wait, Duration::ZERO);
        assert_eq!(p.payload_text(), r#"{"state":"ON"}"#);
    }

    #[test]
    fn test_qos_from_u8() {
        assert_eq!(QoS::try_from(1).unwrap(), QoS::AtLeastOnce);
        assert!(QoS::try_from(3).is_err());
    }
}
