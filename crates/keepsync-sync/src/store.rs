//! Record store facade
//!
//! Typed access to the local store scoped by (partition, dataset, owner).
//!
//! ## Propagation
//!
//! A private write made with [`Propagation::Sync`] bumps the owner's
//! last-updated counter and notifies the registered [`ChangeListener`]
//! (the debounced scheduler) exactly once. [`Propagation::Silent`] writes do
//! neither; downloads, merges and garbage collection replay data silently.
//!
//! ## Unavailable store
//!
//! When the local store reports `Unavailable`, the facade re-initializes it
//! and retries the operation once before surfacing the error.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use keepsync_core::domain::{DatasetId, OwnerId, Partition, Record, RecordKey, Timestamp};
use keepsync_core::ports::{ILocalStore, RecordFilter, StoreError};

use crate::device;

/// Whether a write should be replicated by the next sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Bump the last-updated counter and arm the debounced sync
    Sync,
    /// Write locally only
    Silent,
}

/// Receives one notification per propagating private mutation
pub trait ChangeListener: Send + Sync {
    fn record_changed(&self, dataset: &DatasetId, owner: &OwnerId);
}

/// Facade over an [`ILocalStore`]
#[derive(Clone)]
pub struct RecordStore {
    local: Arc<dyn ILocalStore>,
    listener: Option<Arc<dyn ChangeListener>>,
}

impl RecordStore {
    pub fn new(local: Arc<dyn ILocalStore>) -> Self {
        Self {
            local,
            listener: None,
        }
    }

    /// A handle on the same store that notifies `listener` on propagating writes
    pub fn with_listener(&self, listener: Arc<dyn ChangeListener>) -> Self {
        Self {
            local: Arc::clone(&self.local),
            listener: Some(listener),
        }
    }

    /// Runs `op`, re-initializing the store and retrying once if it is unavailable
    async fn retry_once<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match op().await {
            Err(err) if err.is_unavailable() => {
                warn!(operation, error = %err, "Local store unavailable, reinitializing");
                self.local.reinitialize().await?;
                op().await
            }
            other => other,
        }
    }

    /// Bumps the counter and notifies the listener for one private mutation
    async fn propagate(&self, dataset: &DatasetId, owner: &OwnerId) {
        if let Err(e) = device::set_last_updated(self, dataset, owner, Timestamp::now()).await {
            warn!(%dataset, error = %e, "Failed to bump last-updated counter");
        }
        if let Some(ref listener) = self.listener {
            listener.record_changed(dataset, owner);
        }
    }

    /// Plain write with no propagation, for bookkeeping records
    pub(crate) async fn write(&self, partition: Partition, record: &Record) -> Result<(), StoreError> {
        self.retry_once("put", move || self.local.put(partition, record))
            .await
    }

    pub async fn get(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
    ) -> Result<Option<Record>, StoreError> {
        self.retry_once("get", move || self.local.get(partition, dataset, owner, key))
            .await
    }

    pub async fn put(
        &self,
        partition: Partition,
        record: &Record,
        propagation: Propagation,
    ) -> Result<(), StoreError> {
        self.write(partition, record).await?;
        debug!(%partition, dataset = %record.data_type(), key = %record.key(), "Stored record");
        if propagation == Propagation::Sync && partition == Partition::Private {
            if let Some(owner) = record.owner_id() {
                self.propagate(record.data_type(), owner).await;
            }
        }
        Ok(())
    }

    /// Physically removes a record
    ///
    /// Private data is normally tombstoned with [`RecordStore::put`] instead so
    /// that peers learn of the deletion.
    pub async fn delete(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
        propagation: Propagation,
    ) -> Result<bool, StoreError> {
        let removed = self
            .retry_once("delete", move || self.local.delete(partition, dataset, owner, key))
            .await?;
        if removed && propagation == Propagation::Sync && partition == Partition::Private {
            if let Some(owner) = owner {
                self.propagate(dataset, owner).await;
            }
        }
        Ok(removed)
    }

    /// Refreshes `last_read` in place; never propagates
    ///
    /// Only the one column is written, so a concurrent replace of the slice
    /// is never rolled back.
    pub async fn touch(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
        last_read: Timestamp,
    ) -> Result<bool, StoreError> {
        self.retry_once("touch", move || {
            self.local.touch(partition, dataset, owner, key, last_read)
        })
        .await
    }

    pub async fn query(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError> {
        self.retry_once("query", move || self.local.query(partition, filter))
            .await
    }

    pub async fn delete_matching(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<u64, StoreError> {
        self.retry_once("delete_matching", move || {
            self.local.delete_matching(partition, filter)
        })
        .await
    }

    /// Every record of one owner in `dataset`, tombstones included
    pub async fn list_by_owner(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: &OwnerId,
    ) -> Result<Vec<Record>, StoreError> {
        let filter = RecordFilter::new()
            .with_dataset(dataset.clone())
            .with_owner(owner.clone());
        self.query(partition, &filter).await
    }

    /// Every record of `dataset` across owners, tombstones included
    pub async fn list_by_dataset(
        &self,
        partition: Partition,
        dataset: &DatasetId,
    ) -> Result<Vec<Record>, StoreError> {
        self.query(partition, &RecordFilter::new().with_dataset(dataset.clone()))
            .await
    }

    /// Deletes every record of `dataset` owned by `owner`, or with `invert`
    /// every record NOT owned by `owner`
    pub async fn clear_partition(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: &OwnerId,
        invert: bool,
    ) -> Result<u64, StoreError> {
        let filter = RecordFilter::new().with_dataset(dataset.clone());
        let filter = if invert {
            filter.excluding_owner(owner.clone())
        } else {
            filter.with_owner(owner.clone())
        };
        let removed = self.delete_matching(partition, &filter).await?;
        debug!(%partition, %dataset, invert, removed, "Cleared partition");
        Ok(removed)
    }

    /// Swaps one (dataset, owner) slice for `records` without propagating
    pub async fn replace_slice(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        records: &[Record],
    ) -> Result<(), StoreError> {
        self.retry_once("replace_all", move || {
            self.local.replace_all(partition, dataset, owner, records)
        })
        .await
    }

    /// Drops and recreates every partition
    pub async fn recreate(&self) -> Result<(), StoreError> {
        self.retry_once("recreate", move || self.local.recreate())
            .await
    }
}
