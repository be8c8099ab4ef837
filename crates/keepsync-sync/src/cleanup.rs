//! Garbage collector
//!
//! Two independent sweeps, both idempotent and safe to interrupt:
//!
//! - **TTL expiry**: records whose `last_read` fell behind `now - ttl` are
//!   physically removed from the public and private partitions.
//! - **Orphan cleanup**: private records pointing at a parent key that no
//!   longer exists (live) in the parent dataset are removed.
//!
//! Sweeps never propagate: removals are not replicated by the next sync.
//! Errors are collected into the [`CleanupReport`] instead of aborting.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use keepsync_core::config::CleanupConfig;
use keepsync_core::domain::{CleanupReport, DatasetId, DomainError, OwnerId, Partition, Timestamp};
use keepsync_core::ports::{RecordFilter, StoreError};

use crate::store::{Propagation, RecordStore};

/// Runs TTL and orphan sweeps over the local store
#[derive(Clone)]
pub struct GarbageCollector {
    store: RecordStore,
    config: CleanupConfig,
    datasets: Vec<DatasetId>,
    parent_dataset: Option<DatasetId>,
}

impl GarbageCollector {
    /// # Errors
    /// Returns `InvalidDataset` if a configured dataset name is invalid
    pub fn new(store: RecordStore, config: &CleanupConfig) -> Result<Self, DomainError> {
        let datasets = config
            .datasets
            .iter()
            .map(|name| DatasetId::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_dataset = config
            .parent_dataset
            .as_deref()
            .map(DatasetId::new)
            .transpose()?;
        Ok(Self {
            store,
            config: config.clone(),
            datasets,
            parent_dataset,
        })
    }

    pub fn parent_dataset(&self) -> Option<&DatasetId> {
        self.parent_dataset.as_ref()
    }

    /// Removes expired records of `dataset`
    ///
    /// Private records are limited to `owner` when given; public records
    /// have no owner and are always swept.
    pub async fn expire(
        &self,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        let cutoff = now.saturating_sub(self.config.ttl_for(dataset));
        let public = RecordFilter::new()
            .with_dataset(dataset.clone())
            .with_last_read_before(cutoff);
        let private = match owner {
            Some(owner) => public.clone().with_owner(owner.clone()),
            None => public.clone(),
        };

        let removed = self.store.delete_matching(Partition::Public, &public).await?
            + self.store.delete_matching(Partition::Private, &private).await?;
        if removed > 0 {
            debug!(%dataset, removed, cutoff = cutoff.as_millis(), "Expired records");
        }
        Ok(removed)
    }

    /// Removes private records whose parent is gone
    ///
    /// A no-op unless a parent dataset is configured.
    pub async fn remove_orphans(&self) -> Result<u64, StoreError> {
        let Some(ref parent_dataset) = self.parent_dataset else {
            return Ok(0);
        };

        let parents = self
            .store
            .query(
                Partition::Private,
                &RecordFilter::new()
                    .with_dataset(parent_dataset.clone())
                    .live_only(),
            )
            .await?;
        // Parent keys are matched across owners
        let valid: HashSet<&str> = parents.iter().map(|p| p.key().as_str()).collect();

        let children = self
            .store
            .query(
                Partition::Private,
                &RecordFilter::new()
                    .with_parent()
                    .excluding_dataset(parent_dataset.clone()),
            )
            .await?;

        let mut removed = 0;
        for child in children {
            let Some(parent_id) = child.parent_id() else {
                continue;
            };
            if valid.contains(parent_id) {
                continue;
            }
            if self
                .store
                .delete(
                    Partition::Private,
                    child.data_type(),
                    child.owner_id(),
                    child.key(),
                    Propagation::Silent,
                )
                .await?
            {
                debug!(dataset = %child.data_type(), key = %child.key(), parent = parent_id, "Removed orphan");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Best-effort pass run at the end of a sync cycle
    pub async fn after_sync(
        &self,
        dataset: &DatasetId,
        owner: &OwnerId,
        now: Timestamp,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();
        match self.expire(dataset, Some(owner), now).await {
            Ok(n) => report.expired = n,
            Err(e) => {
                warn!(%dataset, error = %e, "TTL sweep failed");
                report.errors.push(format!("expire {dataset}: {e}"));
            }
        }
        if self.config.orphan_cleanup {
            self.sweep_orphans(&mut report).await;
        }
        report
    }

    /// Full pass over every configured dataset
    pub async fn sweep(&self, now: Timestamp) -> CleanupReport {
        let mut report = CleanupReport::default();
        for dataset in &self.datasets {
            match self.expire(dataset, None, now).await {
                Ok(n) => report.expired += n,
                Err(e) => {
                    warn!(%dataset, error = %e, "TTL sweep failed");
                    report.errors.push(format!("expire {dataset}: {e}"));
                }
            }
        }
        if self.config.orphan_cleanup {
            self.sweep_orphans(&mut report).await;
        }
        info!(
            expired = report.expired,
            orphaned = report.orphaned,
            errors = report.errors.len(),
            "Cleanup completed"
        );
        report
    }

    /// Orphan sweep only, regardless of the `orphan_cleanup` switch
    pub async fn sweep_orphans_now(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        self.sweep_orphans(&mut report).await;
        report
    }

    async fn sweep_orphans(&self, report: &mut CleanupReport) {
        match self.remove_orphans().await {
            Ok(n) => report.orphaned += n,
            Err(e) => {
                warn!(error = %e, "Orphan sweep failed");
                report.errors.push(format!("orphans: {e}"));
            }
        }
    }
}
