//! Structured outcomes of sync-family and maintenance operations
//!
//! Sync operations never raise: they always hand back a [`SyncReport`]
//! naming the action taken and, when something went wrong, a
//! [`SyncFailure`] describing it.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::newtypes::DatasetId;

/// Action a sync cycle settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Uploaded,
    Downloaded,
    Merged,
    NoActionNeeded,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Uploaded => "uploaded",
            SyncAction::Downloaded => "downloaded",
            SyncAction::Merged => "merged",
            SyncAction::NoActionNeeded => "no_action_needed",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a failed sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Remote refused the credentials; not retried
    AccessDenied,
    /// Network or server trouble; a later cycle may succeed
    Transient,
    /// Local store could not be reached even after re-initialization
    StoreUnavailable,
    /// Payload failed the structural validity check
    Validation,
    /// Remote data could not be decoded
    Corrupt,
}

/// Error half of a [`SyncReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SyncFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Counts of records removed by a garbage-collection pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Records removed because `last_read` fell behind the TTL cutoff
    pub expired: u64,
    /// Records removed because their parent no longer exists
    pub orphaned: u64,
    /// Non-fatal errors hit while sweeping
    pub errors: Vec<String>,
}

impl CleanupReport {
    /// Total records removed
    pub fn total(&self) -> u64 {
        self.expired + self.orphaned
    }

    /// Folds another report into this one
    pub fn merge(&mut self, other: CleanupReport) {
        self.expired += other.expired;
        self.orphaned += other.orphaned;
        self.errors.extend(other.errors);
    }
}

/// Result of one sync-family operation on one dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub dataset: DatasetId,
    pub action: SyncAction,
    pub error: Option<SyncFailure>,
    pub cleanup: CleanupReport,
}

impl SyncReport {
    pub fn new(dataset: DatasetId, action: SyncAction) -> Self {
        Self {
            dataset,
            action,
            error: None,
            cleanup: CleanupReport::default(),
        }
    }

    /// A failed cycle; the action is reported as `no_action_needed`
    pub fn failed(dataset: DatasetId, failure: SyncFailure) -> Self {
        Self {
            dataset,
            action: SyncAction::NoActionNeeded,
            error: Some(failure),
            cleanup: CleanupReport::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
