//! MQTT-style topic filters
//!
//! Topics are slash-delimited. In a filter, `+` matches exactly one level
//! and `#` (only as the last level) matches the remaining levels, including
//! none.

use crate::error::BusError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    Exact(String),
    Single,
    Multi,
}

/// A parsed topic filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    raw: String,
    levels: Vec<Level>,
}

impl TopicFilter {
    /// Parse a filter, rejecting misplaced wildcards
    pub fn new(filter: &str) -> Result<Self, BusError> {
        if filter.is_empty() {
            return Err(BusError::InvalidFilter("empty filter".to_string()));
        }

        let parts: Vec<&str> = filter.split('/').collect();
        let mut levels = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let level = match *part {
                "#" if i == parts.len() - 1 => Level::Multi,
                "+" => Level::Single,
                p if p.contains('#') || p.contains('+') => {
                    return Err(BusError::InvalidFilter(filter.to_string()))
                }
                p => Level::Exact(p.to_string()),
            };
            levels.push(level);
        }

        Ok(Self {
            raw: filter.to_string(),
            levels,
        })
    }

    /// Filter matching every topic
    #[must_use]
    pub fn all() -> Self {
        Self {
            raw: "#".to_string(),
            levels: vec![Level::Multi],
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check whether a concrete topic matches this filter
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split('/');
        for level in &self.levels {
            match level {
                Level::Multi => return true,
                Level::Single => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Level::Exact(expected) => match parts.next() {
                    Some(part) if part == expected => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }
}

/// Check that a topic is publishable (non-empty, no wildcards)
pub fn validate_topic(topic: &str) -> Result<(), BusError> {
    if topic.is_empty() || topic.contains('#') || topic.contains('+') {
        return Err(BusError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}
