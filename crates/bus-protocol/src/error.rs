//! Error types for the bus protocol

use thiserror::Error;

/// Bus errors
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Bus closed")]
    Closed,

    #[error("Invalid topic filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Publish rejected: {0}")]
    Rejected(String),
}

/// Errors raised while interpreting an event payload
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Payload is not valid UTF-8")]
    NotText,

    #[error("Unknown time of day: {0}")]
    UnknownTimeOfDay(String),
}
