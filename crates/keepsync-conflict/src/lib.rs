//! KeepSync Conflict - Sync direction and merge
//!
//! Provides:
//! - Device marker comparison deciding upload, download or no action
//! - Deterministic last-writer-wins merge of two record sets with
//!   tombstone handling
//!
//! Everything here is pure: no I/O, no clock reads.

pub mod error;
pub mod marker;
pub mod merge;

pub use error::ConflictError;
pub use marker::{MarkerDecider, SyncDecision, DEFAULT_CLOCK_SKEW_TOLERANCE};
pub use merge::{merge, merge_records, MergeOutcome, MergeStats};
