use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single data-access operation failed.
///
/// Workloads never propagate these: they are timed, reported as a failed sample, logged,
/// and the loop moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP {0}: {1}")]
    HttpError(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

/// `pick` was asked to choose from an empty slice.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cannot pick from an empty collection")]
pub struct EmptyInputError;

/// An error escaped a behavior's `init` or `run` control flow; the run is aborted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("init failed: {0}")]
    Init(String),

    #[error("run failed: {0}")]
    Run(String),

    #[error(transparent)]
    EmptyInput(#[from] EmptyInputError),

    #[error("behavior panicked: {0}")]
    Panicked(String),
}

/// A flush sink rejected or failed to receive a batch. The batch is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("delivery transport error: {0}")]
    Transport(String),

    #[error("delivery rejected with HTTP {0}")]
    Rejected(u16),

    #[error("delivery callback failed: {0}")]
    Callback(String),
}

/// Behavior configuration did not satisfy its declared schema.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown config field: {0}")]
    UnknownField(String),

    #[error("missing required config field: {0}")]
    MissingField(String),

    #[error("config field {field} must be a {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("config field {field} = {value} is below minimum {min}")]
    BelowMin { field: String, value: f64, min: f64 },

    #[error("config field {field} = {value} is above maximum {max}")]
    AboveMax { field: String, value: f64, max: f64 },

    #[error("config must be a JSON object")]
    NotAnObject,
}
