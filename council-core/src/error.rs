//! Error types for Council

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for Council operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Council operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Collaborator could not be spawned or exited abnormally
    #[error("Agent error: {0}")]
    Agent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No collaborator registered under the requested name
    #[error("Collaborator not found: {0}")]
    NotFound(String),

    /// A collaborator or validation stage exceeded its timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed input rejected at construction time
    #[error("Invalid input: {0}")]
    Invalid(#[from] ValidationError),

    /// A persisted queue record failed validation
    #[error("Invalid record {}: {source}", path.display())]
    Record {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Construction-time validation failures for issues, verdicts and instructions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid severity '{0}' (expected error, warning or suggestion)")]
    InvalidSeverity(String),

    #[error("invalid priority '{0}' (expected high, medium or low)")]
    InvalidPriority(String),

    #[error("invalid status '{0}' (expected pass, warn or fail)")]
    InvalidStatus(String),

    #[error("invalid line number: {0}")]
    InvalidLine(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("affected_files must be an array of paths")]
    InvalidAffectedFiles,
}
