//! Error types for the merge engine

use thiserror::Error;

/// Errors that can occur while reconciling record sets
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// The inputs mix records of different (dataset, owner) slices
    #[error("records span more than one slice: expected {expected}, found {found}")]
    MixedSlice { expected: String, found: String },

    /// One side lists the same key twice
    #[error("duplicate key {key} in {side} records")]
    DuplicateKey { side: &'static str, key: String },
}
