//! Domain entities and business logic
//!
//! - Newtypes for dataset, owner, key and device identifiers
//! - The [`Record`] envelope and its storage [`Partition`]
//! - Remote envelopes ([`Snapshot`], [`DeviceMarker`])
//! - Structured sync outcomes ([`SyncReport`])

pub mod errors;
pub mod newtypes;
pub mod record;
pub mod report;
pub mod snapshot;

pub use errors::DomainError;
pub use newtypes::*;
pub use record::{Partition, Record};
pub use report::{CleanupReport, FailureKind, SyncAction, SyncFailure, SyncReport};
pub use snapshot::{DeviceMarker, Snapshot};
