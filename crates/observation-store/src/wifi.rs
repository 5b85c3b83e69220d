//! Presence from the router's Wi-Fi client list

use crate::error::ExtractError;
use crate::extractor::Extractor;
use crate::store::StateValueMap;
use bus_protocol::BusEvent;

/// Normalise a MAC address to upper-case, colon-separated form
///
/// Accepts `:` or `-` separators. Returns `None` for anything that is not
/// six hex octets.
#[must_use]
pub fn normalize_mac(mac: &str) -> Option<String> {
    let octets: Vec<&str> = mac.trim().split([':', '-']).collect();
    if octets.len() != 6
        || !octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }
    Some(octets.join(":").to_ascii_uppercase())
}

/// Asserts `key` when any listed client matches a configured device
///
/// The list is a JSON array of records carrying a `MacAddress` field.
pub struct WifiPresence {
    topic: String,
    macs: Vec<String>,
    key: String,
}

impl WifiPresence {
    /// `macs` must already be normalised (see [`normalize_mac`])
    pub fn new(topic: impl Into<String>, macs: Vec<String>, key: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            macs,
            key: key.into(),
        }
    }
}

impl Extractor for WifiPresence {
    fn name(&self) -> &str {
        "wifi clients"
    }

    fn extract(&self, event: &BusEvent, store: &StateValueMap) -> Result<(), ExtractError> {
        if event.topic != self.topic {
            return Ok(());
        }

        let doc = event.payload.json()?;
        let clients = doc.as_array().ok_or_else(|| ExtractError::WrongType {
            field: "<payload>".to_string(),
            expected: "JSON array",
        })?;

        let present = clients
            .iter()
            .filter_map(|client| client.get("MacAddress").and_then(|m| m.as_str()))
            .filter_map(normalize_mac)
            .any(|mac| self.macs.contains(&mac));

        store.set(&self.key, present);
        Ok(())
    }
}
