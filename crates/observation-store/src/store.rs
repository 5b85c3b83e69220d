//! The observation store
//!
//! `StateValueMap` maps proposition keys to observation records and answers
//! temporal predicates over them. A single reader/writer lock protects the
//! map, the records and the callback list; change callbacks run inside the
//! write critical section and therefore must not call back into the store.

use crate::clock::{Clock, SystemClock};
use crate::record::ObservationRecord;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// Description of a single write, handed to change callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change<'a> {
    pub key: &'a str,
    pub value: bool,
    /// First write ever for this key
    pub is_new: bool,
    /// Value differs from the one held before the write
    pub value_changed: bool,
}

/// Result of a `set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOutcome {
    pub is_new: bool,
    pub value_changed: bool,
}

type ChangeCallback = Box<dyn Fn(&Change<'_>) + Send + Sync>;

#[derive(Default)]
struct Inner {
    records: HashMap<String, ObservationRecord>,
    callbacks: Vec<ChangeCallback>,
}

/// Concurrent, time-aware map of propositions
pub struct StateValueMap {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl Default for StateValueMap {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl StateValueMap {
    /// Create an empty store reading time from `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }

    /// Current time according to the store's clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record a write of `value` for `key`
    pub fn set(&self, key: &str, value: bool) -> SetOutcome {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let outcome = match inner.records.get_mut(key) {
            Some(record) => {
                // Keep last_update strictly increasing even if the clock stalls
                let at = if now > record.last_update {
                    now
                } else {
                    record.last_update + Duration::microseconds(1)
                };
                let value_changed = record.value != value;
                record.write(value, at);
                SetOutcome {
                    is_new: false,
                    value_changed,
                }
            }
            None => {
                inner
                    .records
                    .insert(key.to_string(), ObservationRecord::new(value, now));
                SetOutcome {
                    is_new: true,
                    value_changed: true,
                }
            }
        };

        if outcome.value_changed {
            tracing::debug!(key, value, is_new = outcome.is_new, "State changed");
        } else {
            tracing::trace!(key, value, "State reasserted");
        }

        let change = Change {
            key,
            value,
            is_new: outcome.is_new,
            value_changed: outcome.value_changed,
        };
        for callback in &inner.callbacks {
            callback(&change);
        }

        outcome
    }

    /// Copy of the record for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ObservationRecord> {
        self.read().records.get(key).copied()
    }

    /// Copy of every record, sorted by key
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, ObservationRecord> {
        self.read()
            .records
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a listener invoked on every write
    ///
    /// The listener runs while the store's write lock is held; it must not
    /// read from or write to the store.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&Change<'_>) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.callbacks.push(Box::new(callback));
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_record(
        &self,
        key: &str,
        f: impl FnOnce(&ObservationRecord, DateTime<Utc>) -> bool,
    ) -> bool {
        let now = self.clock.now();
        self.read().records.get(key).is_some_and(|r| f(r, now))
    }

    #[must_use]
    pub fn currently_true(&self, key: &str) -> bool {
        self.with_record(key, |r, _| r.value)
    }

    #[must_use]
    pub fn currently_false(&self, key: &str) -> bool {
        self.with_record(key, |r, _| !r.value)
    }

    #[must_use]
    pub fn require_true_since(&self, key: &str, d: Duration) -> bool {
        self.with_record(key, |r, now| r.require_true_since(now, d))
    }

    #[must_use]
    pub fn require_false_since(&self, key: &str, d: Duration) -> bool {
        self.with_record(key, |r, now| r.require_false_since(now, d))
    }

    #[must_use]
    pub fn recently_true(&self, key: &str, d: Duration) -> bool {
        self.with_record(key, |r, now| r.recently_true(now, d))
    }

    #[must_use]
    pub fn recently_false(&self, key: &str, d: Duration) -> bool {
        self.with_record(key, |r, now| r.recently_false(now, d))
    }

    #[must_use]
    pub fn not_recently_true(&self, key: &str, d: Duration) -> bool {
        self.with_record(key, |r, now| r.not_recently_true(now, d))
    }

    #[must_use]
    pub fn not_recently_false(&self, key: &str, d: Duration) -> bool {
        self.with_record(key, |r, now| r.not_recently_false(now, d))
    }
}
