//! Remote blob store port (driven/secondary port)
//!
//! A path-addressed object store. Absence of an object is a normal result
//! (`Ok(None)`), never an error.

use thiserror::Error;

/// Errors reported by blob store adapters
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Credentials were rejected; retrying will not help
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Network failure, timeout or server error
    #[error("transient remote error: {0}")]
    Transient(String),

    /// The object path is malformed
    #[error("invalid object path: {0}")]
    InvalidPath(String),
}

impl RemoteError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, RemoteError::AccessDenied(_))
    }
}

/// Port trait for the remote object store
#[async_trait::async_trait]
pub trait IBlobStore: Send + Sync {
    /// Fetches an object; `Ok(None)` when it does not exist
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError>;

    /// Creates or overwrites an object
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), RemoteError>;

    /// Removes an object; deleting an absent object succeeds
    async fn delete(&self, path: &str) -> Result<(), RemoteError>;
}
