//! Extractors turning bus events into store writes
//!
//! An extractor inspects an incoming event and, when the event is one it
//! understands, writes zero or more propositions. Events for other topics
//! are ignored. Payloads that cannot be interpreted produce an error and
//! leave the store untouched.

use crate::error::ExtractError;
use crate::gauge::Gauges;
use crate::store::StateValueMap;
use bus_protocol::{BusEvent, TimeOfDay};
use serde_json::Value;
use std::sync::Arc;

/// Turns events into propositions
pub trait Extractor: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Write the propositions carried by `event`, if any
    fn extract(&self, event: &BusEvent, store: &StateValueMap) -> Result<(), ExtractError>;
}

/// Read a top-level field from a JSON object payload
pub(crate) fn json_field(event: &BusEvent, field: &str) -> Result<Value, ExtractError> {
    let doc = event.payload.json()?;
    let object = doc.as_object().ok_or_else(|| ExtractError::WrongType {
        field: "<payload>".to_string(),
        expected: "JSON object",
    })?;
    object
        .get(field)
        .cloned()
        .ok_or_else(|| ExtractError::MissingField(field.to_string()))
}

fn as_number(field: &str, value: &Value) -> Result<f64, ExtractError> {
    value.as_f64().ok_or_else(|| ExtractError::WrongType {
        field: field.to_string(),
        expected: "number",
    })
}

/// `key = (payload[field] == expected)`
pub struct JsonBool {
    name: String,
    topic: String,
    field: String,
    expected: Value,
    key: String,
}

impl JsonBool {
    pub fn new(
        topic: impl Into<String>,
        field: impl Into<String>,
        expected: impl Into<Value>,
        key: impl Into<String>,
    ) -> Self {
        let topic = topic.into();
        let field = field.into();
        let key = key.into();
        Self {
            name: format!("{key} <- {topic}.{field}"),
            topic,
            field,
            expected: expected.into(),
            key,
        }
    }
}

impl Extractor for JsonBool {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, event: &BusEvent, store: &StateValueMap) -> Result<(), ExtractError> {
        if event.topic != self.topic {
            return Ok(());
        }
        let value = json_field(event, &self.field)?;
        store.set(&self.key, value == self.expected);
        Ok(())
    }
}

/// Numeric reading recorded as a gauge; no store write
pub struct JsonNumeric {
    name: String,
    topic: String,
    field: String,
    gauge: String,
    gauges: Arc<Gauges>,
}

impl JsonNumeric {
    pub fn new(
        topic: impl Into<String>,
        field: impl Into<String>,
        gauge: impl Into<String>,
        gauges: Arc<Gauges>,
    ) -> Self {
        let topic = topic.into();
        let field = field.into();
        let gauge = gauge.into();
        Self {
            name: format!("gauge {gauge} <- {topic}.{field}"),
            topic,
            field,
            gauge,
            gauges,
        }
    }
}

impl Extractor for JsonNumeric {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, event: &BusEvent, _store: &StateValueMap) -> Result<(), ExtractError> {
        if event.topic != self.topic {
            return Ok(());
        }
        let value = as_number(&self.field, &json_field(event, &self.field)?)?;
        tracing::trace!("Gauge {} = {}", self.gauge, value);
        self.gauges.record(&self.gauge, value);
        Ok(())
    }
}

/// `key = (payload[field] < threshold)`
pub struct JsonThreshold {
    name: String,
    topic: String,
    field: String,
    threshold: f64,
    key: String,
}

impl JsonThreshold {
    pub fn new(
        topic: impl Into<String>,
        field: impl Into<String>,
        threshold: f64,
        key: impl Into<String>,
    ) -> Self {
        let topic = topic.into();
        let field = field.into();
        let key = key.into();
        Self {
            name: format!("{key} <- {topic}.{field} < {threshold}"),
            topic,
            field,
            threshold,
            key,
        }
    }
}

impl Extractor for JsonThreshold {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, event: &BusEvent, store: &StateValueMap) -> Result<(), ExtractError> {
        if event.topic != self.topic {
            return Ok(());
        }
        let value = as_number(&self.field, &json_field(event, &self.field)?)?;
        store.set(&self.key, value < self.threshold);
        Ok(())
    }
}

/// `key = (payload == expected)` on the raw text payload
pub struct RawEnum {
    name: String,
    topic: String,
    expected: String,
    key: String,
}

impl RawEnum {
    pub fn new(
        topic: impl Into<String>,
        expected: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        let topic = topic.into();
        let expected = expected.into();
        let key = key.into();
        Self {
            name: format!("{key} <- {topic} == {expected}"),
            topic,
            expected,
            key,
        }
    }
}

impl Extractor for RawEnum {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, event: &BusEvent, store: &StateValueMap) -> Result<(), ExtractError> {
        if event.topic != self.topic {
            return Ok(());
        }
        let text = event.payload.text()?;
        store.set(&self.key, text.trim() == self.expected);
        Ok(())
    }
}

/// `key = (time of day ∈ phases)` for the ticker's time-of-day events
pub struct TimeOfDayPhase {
    name: String,
    topic: String,
    phases: Vec<TimeOfDay>,
    key: String,
}

impl TimeOfDayPhase {
    pub fn new(topic: impl Into<String>, phases: &[TimeOfDay], key: impl Into<String>) -> Self {
        let topic = topic.into();
        let key = key.into();
        Self {
            name: format!("{key} <- {topic} in {phases:?}"),
            topic,
            phases: phases.to_vec(),
            key,
        }
    }
}

impl Extractor for TimeOfDayPhase {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, event: &BusEvent, store: &StateValueMap) -> Result<(), ExtractError> {
        if event.topic != self.topic {
            return Ok(());
        }
        let phase = event.payload.time_of_day()?;
        store.set(&self.key, self.phases.contains(&phase));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus_protocol::Payload;
    use serde_json::json;

    #[test]
    fn test_json_bool() {
        let store = StateValueMap::default();
        let extractor = JsonBool::new("zigbee2mqtt/freezer-door", "contact", false, "freezerDoorOpen");

        extractor
            .extract(&BusEvent::new("zigbee2mqtt/freezer-door", r#"{"contact":false,"battery":90}"#), &store)
            .unwrap();
        assert!(store.currently_true("freezerDoorOpen"));

        extractor
            .extract(&BusEvent::new("zigbee2mqtt/freezer-door", json!({"contact": true})), &store)
            .unwrap();
        assert!(store.currently_false("freezerDoorOpen"));
    }

    #[test]
    fn test_other_topics_are_ignored() {
        let store = StateValueMap::default();
        let extractor = JsonBool::new("mpd/status", "state", "play", "mpdPlay");
        extractor
            .extract(&BusEvent::new("mpd/other", "garbage"), &store)
            .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_parse_errors_do_not_write() {
        let store = StateValueMap::default();
        let extractor = JsonBool::new("mpd/status", "state", "play", "mpdPlay");

        let err = extractor
            .extract(&BusEvent::new("mpd/status", "{not json"), &store)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Payload(_)));

        let err = extractor
            .extract(&BusEvent::new("mpd/status", r#"{"volume":30}"#), &store)
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingField(_)));

        let err = extractor
            .extract(&BusEvent::new("mpd/status", "[1,2]"), &store)
            .unwrap_err();
        assert!(matches!(err, ExtractError::WrongType { .. }));
        assert!(store.get("mpdPlay").is_none());
    }

    #[test]
    fn test_json_threshold() {
        let store = StateValueMap::default();
        let extractor =
            JsonThreshold::new("zigbee2mqtt/freezer-door", "battery", 20.0, "freezerDoorBatteryLow");

        extractor
            .extract(&BusEvent::new("zigbee2mqtt/freezer-door", r#"{"battery":12}"#), &store)
            .unwrap();
        assert!(store.currently_true("freezerDoorBatteryLow"));

        let err = extractor
            .extract(&BusEvent::new("zigbee2mqtt/freezer-door", r#"{"battery":"low"}"#), &store)
            .unwrap_err();
        assert!(matches!(err, ExtractError::WrongType { .. }));
        assert!(store.currently_true("freezerDoorBatteryLow"));
    }

    #[test]
    fn test_json_numeric_records_gauge() {
        let store = StateValueMap::default();
        let gauges = Arc::new(Gauges::new());
        let extractor = JsonNumeric::new(
            "zigbee2mqtt/livingroom-presence",
            "illuminance_lux",
            "livingroom_illuminance",
            gauges.clone(),
        );
        extractor
            .extract(
                &BusEvent::new("zigbee2mqtt/livingroom-presence", r#"{"illuminance_lux":42.5}"#),
                &store,
            )
            .unwrap();
        assert_eq!(gauges.get("livingroom_illuminance"), Some(42.5));
        assert!(store.is_empty());
    }

    #[test]
    fn test_raw_enum() {
        let store = StateValueMap::default();
        let extractor = RawEnum::new("rotel/state/source", "opt1", "rotelSourceTv");
        extractor
            .extract(&BusEvent::new("rotel/state/source", "opt1\n"), &store)
            .unwrap();
        assert!(store.currently_true("rotelSourceTv"));
        extractor
            .extract(&BusEvent::new("rotel/state/source", "coax2"), &store)
            .unwrap();
        assert!(store.currently_false("rotelSourceTv"));
    }

    #[test]
    fn test_time_of_day_phase() {
        let store = StateValueMap::default();
        let extractor = TimeOfDayPhase::new(
            "regelverk/ticker/timeofday",
            &[TimeOfDay::Nighttime],
            "nighttime",
        );
        extractor
            .extract(
                &BusEvent::new(
                    "regelverk/ticker/timeofday",
                    Payload::TimeOfDay(TimeOfDay::Nighttime),
                ),
                &store,
            )
            .unwrap();
        assert!(store.currently_true("nighttime"));

        extractor
            .extract(&BusEvent::new("regelverk/ticker/timeofday", "Daytime"), &store)
            .unwrap();
        assert!(store.currently_false("nighttime"));
    }
}
