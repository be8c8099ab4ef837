//! KeepSync Sync - Synchronization engine and orchestration
//!
//! Provides:
//! - The record store facade with sync propagation and lazy re-open
//! - Device identity and the last-updated counter
//! - Marker-driven upload/download/merge cycles with a per-dataset lock
//! - A debounced per-dataset sync scheduler
//! - TTL and orphan garbage collection
//! - [`DataManager`], the surface application code talks to
//!
//! ## Modules
//!
//! - [`store`] - Record store facade over `ILocalStore`
//! - [`device`] - Device identity and last-updated counter
//! - [`engine`] - Sync engine executing one cycle per dataset and owner
//! - [`scheduler`] - Debounced, cancelable per-dataset timers
//! - [`cleanup`] - Garbage collector
//! - [`manager`] - Public orchestration surface
//! - [`logging`] - Tracing subscriber setup
//!
//! ## Usage
//!
//! A host application installs the subscriber once, then opens a manager:
//!
//! ```no_run
//! use keepsync_core::config::Config;
//! use keepsync_sync::{logging, DataManager};
//!
//! # async fn run() -> Result<(), keepsync_sync::SyncError> {
//! let config = Config::load_or_default(&Config::default_path());
//! logging::init_logging(&config.logging);
//!
//! let manager = DataManager::open(config, None).await?;
//! // ... create, read and sync records ...
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod device;
pub mod engine;
pub mod logging;
pub mod manager;
pub mod scheduler;
pub mod store;

use thiserror::Error;

use keepsync_conflict::ConflictError;
use keepsync_core::domain::{DomainError, FailureKind, SyncFailure};
use keepsync_core::ports::StoreError;
use keepsync_remote::RemoteFacadeError;

pub use cleanup::GarbageCollector;
pub use engine::SyncEngine;
pub use manager::DataManager;
pub use scheduler::DebouncedScheduler;
pub use store::{Propagation, RecordStore};

/// Errors that can occur during data management and synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The remote store or its envelopes failed
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteFacadeError),

    /// A domain-level error propagated from keepsync-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The remote snapshot could not be merged
    #[error("Merge error: {0}")]
    Merge(#[from] ConflictError),

    /// Update or delete addressed a record that does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The configuration is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Classifies the error for a [`SyncReport`](keepsync_core::domain::SyncReport)
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Store(e) if e.is_unavailable() => FailureKind::StoreUnavailable,
            SyncError::Store(StoreError::Serialization(_)) => FailureKind::Corrupt,
            SyncError::Store(_) => FailureKind::Transient,
            SyncError::Remote(RemoteFacadeError::Validation(_)) => FailureKind::Validation,
            SyncError::Remote(RemoteFacadeError::Envelope(_)) => FailureKind::Corrupt,
            SyncError::Remote(e) if e.is_access_denied() => FailureKind::AccessDenied,
            SyncError::Remote(_) => FailureKind::Transient,
            SyncError::Domain(DomainError::ValidationFailed(_)) => FailureKind::Validation,
            SyncError::Domain(_) => FailureKind::Corrupt,
            SyncError::Merge(_) => FailureKind::Corrupt,
            SyncError::NotFound(_) => FailureKind::Validation,
            SyncError::Configuration(_) => FailureKind::Validation,
        }
    }

    pub fn to_failure(&self) -> SyncFailure {
        SyncFailure::new(self.kind(), self.to_string())
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_access_denied())
    }
}
