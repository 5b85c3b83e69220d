//! Error types for the observation store

use bus_protocol::PayloadError;
use thiserror::Error;

/// Errors raised while extracting propositions from an event
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Field {field} is not a {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
}
