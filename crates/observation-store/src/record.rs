//! Observation records and their temporal predicates

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// The stored state of one proposition
///
/// The record is a transcript of writes: writing the value it already holds
/// still moves `last_update` and the matching `last_set_*` forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    pub value: bool,
    pub last_set_true: Option<DateTime<Utc>>,
    pub last_set_false: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
}

impl ObservationRecord {
    /// Record for a proposition written for the first time
    #[must_use]
    pub fn new(value: bool, at: DateTime<Utc>) -> Self {
        Self {
            value,
            last_set_true: value.then_some(at),
            last_set_false: (!value).then_some(at),
            last_update: at,
            first_seen: at,
        }
    }

    /// Apply a write at `at`
    pub fn write(&mut self, value: bool, at: DateTime<Utc>) {
        self.value = value;
        if value {
            self.last_set_true = Some(at);
        } else {
            self.last_set_false = Some(at);
        }
        self.last_update = at;
    }

    fn last_set(&self, value: bool) -> Option<DateTime<Utc>> {
        if value {
            self.last_set_true
        } else {
            self.last_set_false
        }
    }

    /// Whether `value` was written within `d` of `now`
    ///
    /// Zero and negative durations accept any write since the record exists.
    fn set_within(&self, value: bool, now: DateTime<Utc>, d: Duration) -> bool {
        self.last_set(value)
            .is_some_and(|t| d <= Duration::zero() || now - t <= d)
    }

    /// Holds `value` and has held it, as last written, for at least `d`
    fn held_since(&self, value: bool, now: DateTime<Utc>, d: Duration) -> bool {
        self.value == value
            && self
                .last_set(value)
                .is_some_and(|t| d <= Duration::zero() || now - t >= d)
    }

    #[must_use]
    pub fn require_true_since(&self, now: DateTime<Utc>, d: Duration) -> bool {
        self.held_since(true, now, d)
    }

    #[must_use]
    pub fn require_false_since(&self, now: DateTime<Utc>, d: Duration) -> bool {
        self.held_since(false, now, d)
    }

    /// True now, or was written true within `d`
    #[must_use]
    pub fn recently_true(&self, now: DateTime<Utc>, d: Duration) -> bool {
        self.value || self.set_within(true, now, d)
    }

    /// False now, or was written false within `d`
    #[must_use]
    pub fn recently_false(&self, now: DateTime<Utc>, d: Duration) -> bool {
        !self.value || self.set_within(false, now, d)
    }

    /// Definitely not true in the last `d`
    #[must_use]
    pub fn not_recently_true(&self, now: DateTime<Utc>, d: Duration) -> bool {
        !self.value && !self.set_within(true, now, d)
    }

    /// Definitely not false in the last `d`
    #[must_use]
    pub fn not_recently_false(&self, now: DateTime<Utc>, d: Duration) -> bool {
        self.value && !self.set_within(false, now, d)
    }
}
