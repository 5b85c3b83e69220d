//! Latest numeric readings extracted from the bus

use dashmap::DashMap;
use std::collections::BTreeMap;

/// Registry of the most recent value of each numeric reading
#[derive(Debug, Default)]
pub struct Gauges {
    values: DashMap<String, f64>,
}

impl Gauges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(|r| *r.value())
    }

    /// Copy of all readings, sorted by name
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect()
    }
}
