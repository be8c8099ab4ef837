//! Local store port (driven/secondary port)
//!
//! Interface to the durable, indexed record store on this device. Records
//! live in one of three [`Partition`]s and are addressed by
//! (dataset, owner, key); public records have no owner.
//!
//! ## Design Notes
//!
//! - Errors are classified through [`StoreError`] rather than `anyhow`
//!   because callers react differently to an unavailable store (re-open and
//!   retry once) than to a failed query.
//! - [`RecordFilter`] is the only query mechanism; fields combine with AND.
//! - Device identity and the last-updated counter are stored as records in
//!   [`Partition::Metadata`], so no separate key/value API exists.

use thiserror::Error;

use crate::domain::{DatasetId, OwnerId, Partition, Record, RecordKey, Timestamp};

// ============================================================================
// StoreError
// ============================================================================

/// Errors reported by local store adapters
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be opened or its connection was lost
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A query or statement failed
    #[error("query failed: {0}")]
    Query(String),

    /// A stored row could not be mapped back to a record
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether re-initializing the store could make a retry succeed
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

// ============================================================================
// RecordFilter
// ============================================================================

/// Filter criteria for querying or purging records
///
/// All fields are optional; when `None`, no filtering is applied for that
/// field. Multiple filters are combined with AND logic.
///
/// # Example
///
/// ```
/// use keepsync_core::domain::{DatasetId, OwnerId};
/// use keepsync_core::ports::RecordFilter;
///
/// // Every record of one owner in the "messages" dataset
/// let filter = RecordFilter::new()
///     .with_dataset(DatasetId::new("messages").unwrap())
///     .with_owner(OwnerId::new("alice").unwrap());
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Only records of this dataset
    pub dataset: Option<DatasetId>,
    /// Only records of any dataset except this one
    pub exclude_dataset: Option<DatasetId>,
    /// Only records owned by this owner
    pub owner: Option<OwnerId>,
    /// Only records NOT owned by this owner
    pub exclude_owner: Option<OwnerId>,
    /// Only records whose `last_read` is strictly before this instant
    pub last_read_before: Option<Timestamp>,
    /// Only records carrying a non-empty parent reference
    pub has_parent: bool,
    /// Skip tombstones
    pub live_only: bool,
}

impl RecordFilter {
    /// Creates a new empty filter (matches all records)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, dataset: DatasetId) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn excluding_dataset(mut self, dataset: DatasetId) -> Self {
        self.exclude_dataset = Some(dataset);
        self
    }

    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn excluding_owner(mut self, owner: OwnerId) -> Self {
        self.exclude_owner = Some(owner);
        self
    }

    pub fn with_last_read_before(mut self, cutoff: Timestamp) -> Self {
        self.last_read_before = Some(cutoff);
        self
    }

    pub fn with_parent(mut self) -> Self {
        self.has_parent = true;
        self
    }

    pub fn live_only(mut self) -> Self {
        self.live_only = true;
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.dataset.is_none()
            && self.exclude_dataset.is_none()
            && self.owner.is_none()
            && self.exclude_owner.is_none()
            && self.last_read_before.is_none()
            && !self.has_parent
            && !self.live_only
    }

    /// In-process evaluation, used by adapters without a query language
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(ref dataset) = self.dataset {
            if record.data_type() != dataset {
                return false;
            }
        }
        if let Some(ref dataset) = self.exclude_dataset {
            if record.data_type() == dataset {
                return false;
            }
        }
        if let Some(ref owner) = self.owner {
            if record.owner_id() != Some(owner) {
                return false;
            }
        }
        if let Some(ref owner) = self.exclude_owner {
            if record.owner_id() == Some(owner) {
                return false;
            }
        }
        if let Some(cutoff) = self.last_read_before {
            if record.last_read() >= cutoff {
                return false;
            }
        }
        if self.has_parent && record.parent_id().is_none() {
            return false;
        }
        if self.live_only && record.is_deleted() {
            return false;
        }
        true
    }
}

// ============================================================================
// ILocalStore trait
// ============================================================================

/// Port trait for the durable local record store
#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    /// Looks up a record by primary key
    async fn get(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
    ) -> Result<Option<Record>, StoreError>;

    /// Inserts or replaces a record; dataset and owner come from the record
    async fn put(&self, partition: Partition, record: &Record) -> Result<(), StoreError>;

    /// Physically removes a record; returns whether a row was deleted
    async fn delete(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
    ) -> Result<bool, StoreError>;

    /// Sets `last_read` on one record and leaves every other column alone;
    /// returns whether the record exists
    async fn touch(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
        last_read: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Returns every record matching the filter
    async fn query(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError>;

    /// Physically removes every record matching the filter
    async fn delete_matching(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<u64, StoreError>;

    /// Replaces the records of one (dataset, owner) slice in a single step
    async fn replace_all(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        records: &[Record],
    ) -> Result<(), StoreError>;

    /// Re-opens the underlying store after it reported `Unavailable`
    async fn reinitialize(&self) -> Result<(), StoreError>;

    /// Drops and recreates every partition
    async fn recreate(&self) -> Result<(), StoreError>;
}
