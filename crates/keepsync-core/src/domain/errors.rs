//! Domain error types
//!
//! Validation failures raised while constructing identifiers, records and
//! configuration values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Dataset identifier is empty or contains forbidden characters
    #[error("Invalid dataset id: {0}")]
    InvalidDataset(String),

    /// Owner identifier is empty
    #[error("Invalid owner id: {0}")]
    InvalidOwner(String),

    /// Record key is empty or contains forbidden characters
    #[error("Invalid record key: {0}")]
    InvalidKey(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Payload is missing a required field
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Configuration is contradictory or incomplete
    #[error("Configuration error: {0}")]
    Configuration(String),
}
