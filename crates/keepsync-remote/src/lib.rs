//! KeepSync Remote - remote object store adapters
//!
//! Provides:
//! - [`client::HttpBlobStore`], an HTTP implementation of `IBlobStore`
//! - [`memory::MemoryBlobStore`], an in-process store for tests and offline use
//! - [`facade::RemoteFacade`], typed snapshot/marker/public-record access
//!   with JSON envelopes and the payload validation gate
//!
//! ## Modules
//!
//! - [`client`] - HTTP blob store client
//! - [`facade`] - Snapshot, device marker and public record envelopes
//! - [`memory`] - In-memory blob store
//! - [`paths`] - Remote object path layout

pub mod client;
pub mod facade;
pub mod memory;
pub mod paths;

use thiserror::Error;

use keepsync_core::ports::RemoteError;

pub use client::HttpBlobStore;
pub use facade::RemoteFacade;
pub use memory::MemoryBlobStore;

/// Errors that can occur in the remote facade
#[derive(Debug, Error)]
pub enum RemoteFacadeError {
    /// The blob store failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A payload failed its dataset's validation rules and was not uploaded
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A remote object could not be encoded or decoded
    #[error("Invalid envelope: {0}")]
    Envelope(String),
}

impl RemoteFacadeError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, RemoteFacadeError::Remote(e) if e.is_access_denied())
    }
}
