//! Publish/subscribe bus protocol for Regelverk
//!
//! This crate defines the messages exchanged with the home bus (events,
//! payloads, publication requests), MQTT-style topic filters and the
//! `MessageBus` seam, together with an in-process bus implementation.

pub mod bus;
pub mod error;
pub mod event;
pub mod publication;
pub mod topic;

pub use bus::{DryRunBus, LocalBus, MessageBus, Subscription};
pub use error::{BusError, PayloadError};
pub use event::{BusEvent, Payload, TimeOfDay};
pub use publication::{Publication, QoS};
pub use topic::TopicFilter;
