//! Error types for the rule engine

use thiserror::Error;

/// Errors that can occur while building or running the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The dispatcher loop was started twice
    #[error("Engine is already running")]
    AlreadyRunning,

    /// Bus error
    #[error("Bus error: {0}")]
    Bus(#[from] bus_protocol::BusError),
}

/// Errors raised by state machine entry and exit actions
#[derive(Error, Debug)]
pub enum ActionError {
    /// The environment is not in a state the action can work with
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Building a publication failed
    #[error("Invalid publication: {0}")]
    Publication(String),
}
