//! DataManager - the surface application code talks to
//!
//! Public data is written to the local cache and to the remote store in the
//! same call. Private data is written locally only; every propagating write
//! arms a debounced sync for its dataset, and the sync cycle carries the
//! change to the remote snapshot.
//!
//! Sync-family operations return a [`SyncReport`] and never fail. CRUD
//! operations return `Result`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use keepsync_cache::{DatabasePool, SqliteRecordStore};
use keepsync_core::config::Config;
use keepsync_core::domain::{
    CleanupReport, DatasetId, DomainError, OwnerId, Partition, Record, RecordKey, SyncReport,
    Timestamp,
};
use keepsync_core::keys::content_key;
use keepsync_core::ports::{IBlobStore, ILocalStore, RecordFilter, StoreError};
use keepsync_core::validation::Validator;
use keepsync_remote::{HttpBlobStore, RemoteFacade};

use crate::cleanup::GarbageCollector;
use crate::device;
use crate::engine::SyncEngine;
use crate::scheduler::DebouncedScheduler;
use crate::store::{ChangeListener, Propagation, RecordStore};
use crate::SyncError;

/// Owners with unsynced writes, per dataset
type PendingOwners = DashMap<DatasetId, HashSet<OwnerId>>;

/// Arms the debounced sync whenever a private record changes
struct SyncTrigger {
    engine: Arc<SyncEngine>,
    scheduler: Arc<DebouncedScheduler>,
    pending: Arc<PendingOwners>,
    delay: Duration,
}

impl SyncTrigger {
    fn arm(&self, dataset: &DatasetId, owner: &OwnerId, delay: Duration) {
        self.pending
            .entry(dataset.clone())
            .or_default()
            .insert(owner.clone());

        let engine = Arc::clone(&self.engine);
        let pending = Arc::clone(&self.pending);
        let target = dataset.clone();
        self.scheduler.trigger(dataset.clone(), delay, move || async move {
            let owners = pending
                .remove(&target)
                .map(|(_, owners)| owners)
                .unwrap_or_default();
            for owner in owners {
                let report = engine.sync(&target, &owner).await;
                if let Some(ref failure) = report.error {
                    warn!(dataset = %target, %failure, "Debounced sync failed");
                }
            }
        });
    }

    fn cancel(&self, dataset: &DatasetId) -> bool {
        self.pending.remove(dataset);
        self.scheduler.cancel(dataset)
    }
}

impl ChangeListener for SyncTrigger {
    fn record_changed(&self, dataset: &DatasetId, owner: &OwnerId) {
        self.arm(dataset, owner, self.delay);
    }
}

/// Orchestrates local storage, remote storage and synchronization
pub struct DataManager {
    config: Config,
    store: RecordStore,
    remote: RemoteFacade,
    engine: Arc<SyncEngine>,
    gc: GarbageCollector,
    trigger: Arc<SyncTrigger>,
}

impl DataManager {
    /// Wires a manager over the given adapters
    ///
    /// # Errors
    /// `Configuration` if the configuration does not validate. Must be
    /// called within a Tokio runtime for debounced syncs to fire.
    pub fn new(
        config: Config,
        local: Arc<dyn ILocalStore>,
        blobs: Arc<dyn IBlobStore>,
    ) -> Result<Self, SyncError> {
        let errors = config.validate();
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SyncError::Configuration(message));
        }

        let validator = Validator::from_config(&config.validation.required_fields)
            .map_err(|e| SyncError::Configuration(e.to_string()))?;
        let remote = RemoteFacade::new(blobs, validator, config.sync.marker_scope);

        let base = RecordStore::new(local);
        let gc = GarbageCollector::new(base.clone(), &config.cleanup)
            .map_err(|e| SyncError::Configuration(e.to_string()))?;
        let engine = Arc::new(SyncEngine::new(
            base.clone(),
            remote.clone(),
            gc.clone(),
            &config.sync,
        ));

        let trigger = Arc::new(SyncTrigger {
            engine: Arc::clone(&engine),
            scheduler: Arc::new(DebouncedScheduler::new()),
            pending: Arc::new(PendingOwners::new()),
            delay: config.sync.debounce_delay(),
        });
        let store = base.with_listener(trigger.clone());

        info!(
            marker_scope = ?config.sync.marker_scope,
            debounce_ms = config.sync.debounce_delay_ms,
            "Data manager ready"
        );
        Ok(Self {
            config,
            store,
            remote,
            engine,
            gc,
            trigger,
        })
    }

    /// Opens the SQLite store at `storage.database_path` and the HTTP blob
    /// store at `remote.base_url`
    ///
    /// # Errors
    /// `Configuration` if no remote base URL is set, `Store` if the
    /// database cannot be opened
    pub async fn open(config: Config, access_token: Option<&str>) -> Result<Self, SyncError> {
        let base_url = config
            .remote
            .base_url
            .clone()
            .ok_or_else(|| SyncError::Configuration("remote.base_url is not set".into()))?;

        let pool = DatabasePool::new(&config.storage.database_path)
            .await
            .map_err(StoreError::from)?;
        let local = Arc::new(SqliteRecordStore::new(pool));

        let mut http =
            HttpBlobStore::with_timeout(base_url, Duration::from_secs(config.remote.timeout_secs));
        if let Some(token) = access_token {
            http.set_access_token(token);
        }

        Self::new(config, local, Arc::new(http))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn validate(&self, dataset: &DatasetId, payload: &Value) -> Result<(), SyncError> {
        self.remote.validator().validate(dataset, payload)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Public data
    // ------------------------------------------------------------------

    /// Stores a shared document locally and remotely under its content key
    pub async fn create_public(
        &self,
        dataset: &DatasetId,
        payload: Value,
    ) -> Result<Record, SyncError> {
        self.validate(dataset, &payload)?;
        let key = content_key(&payload)?;
        let record = Record::new(key, dataset.clone(), None, payload);

        self.store
            .put(Partition::Public, &record, Propagation::Silent)
            .await?;
        self.remote.put_public_record(&record).await?;
        debug!(%dataset, key = %record.key(), "Created public record");
        Ok(record)
    }

    /// Reads a shared document, filling the local cache from the remote
    /// store on a miss
    pub async fn read_public(
        &self,
        dataset: &DatasetId,
        key: &RecordKey,
    ) -> Result<Option<Record>, SyncError> {
        let now = Timestamp::now();
        if let Some(mut record) = self.store.get(Partition::Public, dataset, None, key).await? {
            if !record.is_present() {
                return Ok(None);
            }
            self.store
                .touch(Partition::Public, dataset, None, key, now)
                .await?;
            record.touch_read(now);
            return Ok(Some(record));
        }

        let Some(mut record) = self
            .remote
            .get_public_record(dataset, key)
            .await?
            .filter(Record::is_present)
        else {
            return Ok(None);
        };
        record.touch_read(now);
        self.store
            .put(Partition::Public, &record, Propagation::Silent)
            .await?;
        debug!(%dataset, %key, "Filled public cache from remote");
        Ok(Some(record))
    }

    pub async fn update_public(
        &self,
        dataset: &DatasetId,
        key: &RecordKey,
        payload: Value,
    ) -> Result<Record, SyncError> {
        self.validate(dataset, &payload)?;
        let mut record = self
            .read_public(dataset, key)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("public/{dataset}/{key}")))?;

        record.update_payload(payload, Timestamp::now());
        self.store
            .put(Partition::Public, &record, Propagation::Silent)
            .await?;
        self.remote.put_public_record(&record).await?;
        Ok(record)
    }

    /// Removes a shared document from both stores
    pub async fn delete_public(
        &self,
        dataset: &DatasetId,
        key: &RecordKey,
    ) -> Result<bool, SyncError> {
        let removed = self
            .store
            .delete(Partition::Public, dataset, None, key, Propagation::Silent)
            .await?;
        self.remote.delete_public_record(dataset, key).await?;
        Ok(removed)
    }

    pub async fn has_public_data(&self, dataset: &DatasetId) -> Result<bool, SyncError> {
        let records = self
            .store
            .query(
                Partition::Public,
                &RecordFilter::new().with_dataset(dataset.clone()).live_only(),
            )
            .await?;
        Ok(!records.is_empty())
    }

    // ------------------------------------------------------------------
    // Private data
    // ------------------------------------------------------------------

    /// Writes a private record and arms a sync for its dataset
    ///
    /// Writing over a live record keeps its `created_at`.
    pub async fn create(&self, record: Record) -> Result<Record, SyncError> {
        let Some(owner) = record.owner_id().cloned() else {
            return Err(DomainError::InvalidOwner(format!(
                "private record {} has no owner",
                record.key()
            ))
            .into());
        };
        let dataset = record.data_type().clone();
        self.validate(&dataset, record.payload())?;

        let existing = self
            .store
            .get(Partition::Private, &dataset, Some(&owner), record.key())
            .await?;
        let record = match existing {
            Some(mut existing) if existing.is_present() => {
                existing.update_payload(record.payload().clone(), Timestamp::now());
                existing.with_parent(record.parent_id().unwrap_or_default())
            }
            _ => record,
        };

        self.store
            .put(Partition::Private, &record, Propagation::Sync)
            .await?;
        Ok(record)
    }

    /// A live private record; reading refreshes its `last_read`
    pub async fn read(
        &self,
        dataset: &DatasetId,
        owner: &OwnerId,
        key: &RecordKey,
    ) -> Result<Option<Record>, SyncError> {
        let Some(mut record) = self
            .store
            .get(Partition::Private, dataset, Some(owner), key)
            .await?
            .filter(Record::is_present)
        else {
            return Ok(None);
        };

        let now = Timestamp::now();
        self.store
            .touch(Partition::Private, dataset, Some(owner), key, now)
            .await?;
        record.touch_read(now);
        Ok(Some(record))
    }

    /// # Errors
    /// `NotFound` if no live record exists under `key`
    pub async fn update(
        &self,
        dataset: &DatasetId,
        owner: &OwnerId,
        key: &RecordKey,
        payload: Value,
    ) -> Result<Record, SyncError> {
        self.validate(dataset, &payload)?;
        let mut record = self
            .store
            .get(Partition::Private, dataset, Some(owner), key)
            .await?
            .filter(Record::is_present)
            .ok_or_else(|| SyncError::NotFound(format!("{dataset}/{owner}/{key}")))?;

        record.update_payload(payload, Timestamp::now());
        self.store
            .put(Partition::Private, &record, Propagation::Sync)
            .await?;
        Ok(record)
    }

    /// Tombstones a private record; returns whether a live record existed
    pub async fn delete(
        &self,
        dataset: &DatasetId,
        owner: &OwnerId,
        key: &RecordKey,
    ) -> Result<bool, SyncError> {
        let Some(mut record) = self
            .store
            .get(Partition::Private, dataset, Some(owner), key)
            .await?
            .filter(Record::is_present)
        else {
            return Ok(false);
        };

        record.mark_deleted(Timestamp::now());
        self.store
            .put(Partition::Private, &record, Propagation::Sync)
            .await?;
        Ok(true)
    }

    pub async fn exists(
        &self,
        dataset: &DatasetId,
        owner: &OwnerId,
        key: &RecordKey,
    ) -> Result<bool, SyncError> {
        Ok(self
            .store
            .get(Partition::Private, dataset, Some(owner), key)
            .await?
            .is_some_and(|r| r.is_present()))
    }

    /// Whether the owner holds any live record in `dataset`
    pub async fn has_data(&self, dataset: &DatasetId, owner: &OwnerId) -> Result<bool, SyncError> {
        Ok(!self.list(dataset, owner).await?.is_empty())
    }

    /// Live private records of one owner, sorted by key
    pub async fn list(&self, dataset: &DatasetId, owner: &OwnerId) -> Result<Vec<Record>, SyncError> {
        let filter = RecordFilter::new()
            .with_dataset(dataset.clone())
            .with_owner(owner.clone())
            .live_only();
        Ok(self.store.query(Partition::Private, &filter).await?)
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    pub async fn sync(&self, dataset: &DatasetId, owner: &OwnerId) -> SyncReport {
        self.engine.sync(dataset, owner).await
    }

    pub async fn force_upload(&self, dataset: &DatasetId, owner: &OwnerId) -> SyncReport {
        self.engine.force_upload(dataset, owner).await
    }

    pub async fn force_download(&self, dataset: &DatasetId, owner: &OwnerId) -> SyncReport {
        self.engine.force_download(dataset, owner).await
    }

    pub async fn force_merge(&self, dataset: &DatasetId, owner: &OwnerId) -> SyncReport {
        self.engine.force_merge(dataset, owner).await
    }

    /// Arms a debounced sync; `None` uses `sync.debounce_delay_ms`
    pub fn sync_with_debounce(&self, dataset: &DatasetId, owner: &OwnerId, delay: Option<Duration>) {
        let delay = delay.unwrap_or_else(|| self.config.sync.debounce_delay());
        self.trigger.arm(dataset, owner, delay);
    }

    /// Cancels a not-yet-fired debounced sync; a running cycle is unaffected
    pub fn cancel_sync(&self, dataset: &DatasetId) -> bool {
        self.trigger.cancel(dataset)
    }

    pub fn is_sync_pending(&self, dataset: &DatasetId) -> bool {
        self.trigger.scheduler.is_pending(dataset)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// TTL sweep over `cleanup.datasets`, plus the orphan sweep when enabled
    pub async fn clean_up(&self) -> CleanupReport {
        self.gc.sweep(Timestamp::now()).await
    }

    /// Removes every private record and last-updated counter on this device
    ///
    /// Nothing is propagated; remote snapshots are left as they are.
    pub async fn clear_all_private_data(&self) -> Result<u64, SyncError> {
        let removed = self
            .store
            .delete_matching(Partition::Private, &RecordFilter::new())
            .await?;
        device::clear_counters(&self.store, None).await?;
        info!(removed, "Cleared private data");
        Ok(removed)
    }

    /// Removes private records of every owner but `owner` in `dataset`
    pub async fn clear_other_owners_data(
        &self,
        dataset: &DatasetId,
        owner: &OwnerId,
    ) -> Result<u64, SyncError> {
        Ok(self
            .store
            .clear_partition(Partition::Private, dataset, owner, true)
            .await?)
    }

    pub async fn clear_all_public_data(&self) -> Result<u64, SyncError> {
        let removed = self
            .store
            .delete_matching(Partition::Public, &RecordFilter::new())
            .await?;
        info!(removed, "Cleared public data");
        Ok(removed)
    }

    /// Orphan sweep, whether or not `cleanup.orphan_cleanup` is set
    pub async fn clear_orphaned_data(&self) -> CleanupReport {
        self.gc.sweep_orphans_now().await
    }

    /// Drops and recreates the local database
    ///
    /// Device ids are lost with the metadata partition and regenerated on
    /// the next sync.
    pub async fn force_recreate_database(&self) -> Result<(), SyncError> {
        self.trigger.scheduler.shutdown();
        self.trigger.pending.clear();
        self.store.recreate().await?;
        warn!("Local database recreated");
        Ok(())
    }

    /// Cancels every pending debounced sync
    pub fn shutdown(&self) {
        self.trigger.scheduler.shutdown();
        self.trigger.pending.clear();
    }
}
