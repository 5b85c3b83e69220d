//! Rule engine for Regelverk
//!
//! Coordinates per-subsystem state machines against the shared observation
//! store: bus events are run through the extractors, Bayesian beliefs are
//! refreshed, every controller sees the event, and the publications they
//! return are sent back to the bus.

pub mod backoff;
pub mod config;
pub mod controller;
pub mod controllers;
pub mod error;
pub mod keys;
pub mod machine;
pub mod master;
pub mod publisher;
pub mod rules;
pub mod scheduler;
pub mod sun;
pub mod task;
pub mod ticker;

pub use config::EngineConfig;
pub use controller::{Controller, ControllerContext, Outbox, PublicationSink};
pub use error::{ActionError, EngineError};
pub use machine::StateMachine;
pub use master::{ControllerStatus, IngestReport, Master, MasterBuilder};
pub use publisher::Publisher;
