//! Snapshot synchronization engine
//!
//! The [`SyncEngine`] reconciles one (dataset, owner) slice of the private
//! partition with its remote snapshot.
//!
//! ## Sync Flow
//!
//! 1. **Decision**: compare the remote device marker with this device's id
//!    and last-updated counter ([`MarkerDecider`])
//! 2. **Reconcile**: upload the local slice, or replace it with the remote
//!    snapshot
//! 3. **Marker**: record this device as the last one to sync
//! 4. **Cleanup**: best-effort garbage collection
//!
//! The forced variants skip step 1. `force_merge` replaces step 2 with a
//! last-writer-wins merge whose result is written to both sides.
//!
//! Every cycle on a dataset holds that dataset's lock, so cycles on the same
//! dataset never interleave. Cycles never return an error: failures are
//! reported in the [`SyncReport`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use keepsync_conflict::{merge, MarkerDecider, SyncDecision};
use keepsync_core::config::SyncConfig;
use keepsync_core::domain::{
    DatasetId, DeviceMarker, DomainError, OwnerId, Partition, Snapshot, SyncAction, SyncReport,
    Timestamp,
};
use keepsync_remote::RemoteFacade;

use crate::cleanup::GarbageCollector;
use crate::device;
use crate::store::RecordStore;
use crate::SyncError;

/// Which procedure a cycle runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Auto,
    Upload,
    Download,
    Merge,
}

impl Mode {
    fn as_str(&self) -> &'static str {
        match self {
            Mode::Auto => "sync",
            Mode::Upload => "force_upload",
            Mode::Download => "force_download",
            Mode::Merge => "force_merge",
        }
    }
}

/// Orchestrates sync cycles between the local store and the remote facade
pub struct SyncEngine {
    store: RecordStore,
    remote: RemoteFacade,
    decider: MarkerDecider,
    gc: GarbageCollector,
    cleanup_after_sync: bool,
    locks: DashMap<DatasetId, Arc<Mutex<()>>>,
}

impl SyncEngine {
    /// Creates an engine over `store`
    ///
    /// `store` should carry no change listener: replays made by a cycle are
    /// silent anyway, and the engine never needs to re-arm the scheduler.
    pub fn new(
        store: RecordStore,
        remote: RemoteFacade,
        gc: GarbageCollector,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            remote,
            decider: MarkerDecider::new(Duration::from_millis(config.clock_skew_tolerance_ms)),
            gc,
            cleanup_after_sync: config.cleanup_after_sync,
            locks: DashMap::new(),
        }
    }

    pub fn remote(&self) -> &RemoteFacade {
        &self.remote
    }

    /// Marker-driven cycle: upload, download or nothing
    #[tracing::instrument(skip(self))]
    pub async fn sync(&self, dataset: &DatasetId, owner: &OwnerId) -> SyncReport {
        self.run(dataset, owner, Mode::Auto).await
    }

    /// Uploads the local slice regardless of the marker
    #[tracing::instrument(skip(self))]
    pub async fn force_upload(&self, dataset: &DatasetId, owner: &OwnerId) -> SyncReport {
        self.run(dataset, owner, Mode::Upload).await
    }

    /// Replaces the local slice with the remote snapshot regardless of the marker
    #[tracing::instrument(skip(self))]
    pub async fn force_download(&self, dataset: &DatasetId, owner: &OwnerId) -> SyncReport {
        self.run(dataset, owner, Mode::Download).await
    }

    /// Merges the remote snapshot with the local slice and writes the
    /// result to both sides
    #[tracing::instrument(skip(self))]
    pub async fn force_merge(&self, dataset: &DatasetId, owner: &OwnerId) -> SyncReport {
        self.run(dataset, owner, Mode::Merge).await
    }

    fn lock_for(&self, dataset: &DatasetId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(dataset.clone()).or_default().value())
    }

    async fn run(&self, dataset: &DatasetId, owner: &OwnerId, mode: Mode) -> SyncReport {
        let lock = self.lock_for(dataset);
        let _guard = lock.lock().await;
        let start = Instant::now();

        info!(%dataset, mode = mode.as_str(), "Starting sync cycle");

        let mut report = match self.cycle(dataset, owner, mode).await {
            Ok(action) => SyncReport::new(dataset.clone(), action),
            Err(err) => {
                if err.is_access_denied() {
                    error!(%dataset, error = %err, "Sync refused by remote");
                } else {
                    warn!(%dataset, error = %err, "Sync cycle failed");
                }
                SyncReport::failed(dataset.clone(), err.to_failure())
            }
        };

        if self.cleanup_after_sync {
            report.cleanup = self.gc.after_sync(dataset, owner, Timestamp::now()).await;
        }

        info!(
            %dataset,
            action = %report.action,
            success = report.is_success(),
            cleaned = report.cleanup.total(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Sync cycle completed"
        );
        report
    }

    async fn cycle(
        &self,
        dataset: &DatasetId,
        owner: &OwnerId,
        mode: Mode,
    ) -> Result<SyncAction, SyncError> {
        match mode {
            Mode::Upload => self.upload(dataset, owner).await,
            Mode::Download => self.download(dataset, owner).await,
            Mode::Merge => self.merge(dataset, owner).await,
            Mode::Auto => {
                let device = device::device_id(&self.store, dataset).await?;
                let local = device::last_updated(&self.store, dataset, owner).await?;
                let marker = self.remote.get_marker(dataset, owner).await?;

                let decision = self.decider.decide(marker.as_ref(), device, local);
                debug!(%dataset, %decision, local_last_updated = local.as_millis(), "Sync decision");
                match decision {
                    SyncDecision::Upload => self.upload(dataset, owner).await,
                    SyncDecision::Download => self.download(dataset, owner).await,
                    SyncDecision::NoAction => Ok(SyncAction::NoActionNeeded),
                }
            }
        }
    }

    /// Publishes the whole local slice, tombstones included
    async fn upload(&self, dataset: &DatasetId, owner: &OwnerId) -> Result<SyncAction, SyncError> {
        let records = self
            .store
            .list_by_owner(Partition::Private, dataset, owner)
            .await?;
        let counter = device::last_updated(&self.store, dataset, owner).await?;
        let count = records.len();

        self.remote
            .put_snapshot(owner, dataset, &Snapshot::new(counter, records))
            .await?;
        self.write_marker(dataset, owner, counter).await?;

        info!(%dataset, records = count, "Uploaded local records");
        Ok(SyncAction::Uploaded)
    }

    /// Replaces the local slice with the remote snapshot
    async fn download(&self, dataset: &DatasetId, owner: &OwnerId) -> Result<SyncAction, SyncError> {
        let Some(snapshot) = self.remote.get_snapshot(owner, dataset).await? else {
            // A marker without a snapshot: nothing to pull, claim the slot
            let counter = device::last_updated(&self.store, dataset, owner).await?;
            self.write_marker(dataset, owner, counter).await?;
            debug!(%dataset, "No remote snapshot to download");
            return Ok(SyncAction::NoActionNeeded);
        };
        check_slice(dataset, owner, &snapshot)?;

        self.store
            .replace_slice(Partition::Private, dataset, Some(owner), &snapshot.records)
            .await?;
        device::set_last_updated(&self.store, dataset, owner, snapshot.last_modified).await?;
        self.write_marker(dataset, owner, snapshot.last_modified).await?;

        info!(
            %dataset,
            records = snapshot.records.len(),
            live = snapshot.live_count(),
            "Downloaded remote snapshot"
        );
        Ok(SyncAction::Downloaded)
    }

    /// Two-phase merge: local replace, then remote upload
    ///
    /// A failure between the phases leaves the sides divergent until the
    /// next cycle, which repeats the merge and converges.
    async fn merge(&self, dataset: &DatasetId, owner: &OwnerId) -> Result<SyncAction, SyncError> {
        let remote = self
            .remote
            .get_snapshot(owner, dataset)
            .await?
            .unwrap_or_default();
        check_slice(dataset, owner, &remote)?;
        let local = self
            .store
            .list_by_owner(Partition::Private, dataset, owner)
            .await?;

        let outcome = merge(&remote, &local)?;
        debug!(%dataset, stats = ?outcome.stats, "Merged snapshot");

        self.store
            .replace_slice(Partition::Private, dataset, Some(owner), &outcome.records)
            .await?;

        let now = Timestamp::now();
        device::set_last_updated(&self.store, dataset, owner, now).await?;
        let live = outcome.present_count();
        self.remote
            .put_snapshot(owner, dataset, &Snapshot::new(now, outcome.into_records()))
            .await?;
        self.write_marker(dataset, owner, now).await?;

        info!(%dataset, live, "Merged with remote snapshot");
        Ok(SyncAction::Merged)
    }

    async fn write_marker(
        &self,
        dataset: &DatasetId,
        owner: &OwnerId,
        last_updated: Timestamp,
    ) -> Result<(), SyncError> {
        let device = device::device_id(&self.store, dataset).await?;
        self.remote
            .put_marker(dataset, owner, &DeviceMarker::new(device, last_updated))
            .await?;
        Ok(())
    }
}

/// Rejects snapshots holding records of another dataset or owner
fn check_slice(dataset: &DatasetId, owner: &OwnerId, snapshot: &Snapshot) -> Result<(), SyncError> {
    for record in &snapshot.records {
        if record.data_type() != dataset {
            return Err(DomainError::InvalidDataset(format!(
                "snapshot of {dataset} holds a record of {}",
                record.data_type()
            ))
            .into());
        }
        if record.owner_id() != Some(owner) {
            return Err(DomainError::InvalidOwner(format!(
                "snapshot of {dataset} holds a record of another owner"
            ))
            .into());
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use keepsync_cache::{DatabasePool, SqliteRecordStore};
    use keepsync_core::config::{CleanupConfig, MarkerScope};
    use keepsync_core::domain::{FailureKind, Record, RecordKey};
    use keepsync_core::ports::RemoteError;
    use keepsync_core::validation::Validator;
    use keepsync_remote::MemoryBlobStore;

    use super::*;
    use crate::store::Propagation;

    struct Device {
        engine: SyncEngine,
        store: RecordStore,
    }

    async fn device(blobs: &Arc<MemoryBlobStore>) -> Device {
        let sqlite = SqliteRecordStore::new(DatabasePool::in_memory().await.unwrap());
        let store = RecordStore::new(Arc::new(sqlite));
        let remote = RemoteFacade::new(blobs.clone(), Validator::new(), MarkerScope::PerOwner);
        let gc = GarbageCollector::new(store.clone(), &CleanupConfig::default()).unwrap();
        let engine = SyncEngine::new(store.clone(), remote, gc, &SyncConfig::default());
        Device { engine, store }
    }

    fn notes() -> DatasetId {
        DatasetId::new("notes").unwrap()
    }

    fn alice() -> OwnerId {
        OwnerId::new("alice").unwrap()
    }

    /// Timestamps stay near now so the post-sync TTL sweep keeps fixtures
    fn note(key: &str, text: &str) -> Record {
        Record::new(
            RecordKey::new(key).unwrap(),
            notes(),
            Some(alice()),
            json!({ "text": text }),
        )
    }

    fn later(millis: i64) -> Timestamp {
        Timestamp::from_millis(Timestamp::now().as_millis() + millis)
    }

    async fn write(device: &Device, record: &Record) {
        device
            .store
            .put(Partition::Private, record, Propagation::Sync)
            .await
            .unwrap();
    }

    async fn live_keys(device: &Device) -> Vec<String> {
        device
            .store
            .list_by_owner(Partition::Private, &notes(), &alice())
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_present())
            .map(|r| r.key().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_first_sync_uploads_then_settles() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let a = device(&blobs).await;
        write(&a, &note("n1", "hello")).await;

        let first = a.engine.sync(&notes(), &alice()).await;
        assert_eq!(first.action, SyncAction::Uploaded);
        assert!(first.is_success());

        let second = a.engine.sync(&notes(), &alice()).await;
        assert_eq!(second.action, SyncAction::NoActionNeeded);
        assert!(second.is_success());
    }

    #[tokio::test]
    async fn test_other_device_downloads() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let a = device(&blobs).await;
        let b = device(&blobs).await;
        write(&a, &note("n1", "hello")).await;
        a.engine.sync(&notes(), &alice()).await;

        let report = b.engine.sync(&notes(), &alice()).await;
        assert_eq!(report.action, SyncAction::Downloaded);
        assert_eq!(live_keys(&b).await, vec!["n1"]);

        // B now holds the marker and is in agreement with it
        let again = b.engine.sync(&notes(), &alice()).await;
        assert_eq!(again.action, SyncAction::NoActionNeeded);
    }

    #[tokio::test]
    async fn test_local_write_after_sync_uploads() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let a = device(&blobs).await;
        write(&a, &note("n1", "hello")).await;
        a.engine.sync(&notes(), &alice()).await;

        // Move the counter past the skew tolerance
        write(&a, &note("n2", "again")).await;
        device::set_last_updated(&a.store, &notes(), &alice(), later(5_000))
            .await
            .unwrap();

        let report = a.engine.sync(&notes(), &alice()).await;
        assert_eq!(report.action, SyncAction::Uploaded);
    }

    #[tokio::test]
    async fn test_force_merge_converges_tombstones() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let a = device(&blobs).await;
        let b = device(&blobs).await;

        write(&a, &note("n1", "one")).await;
        write(&a, &note("n2", "two")).await;
        a.engine.sync(&notes(), &alice()).await;
        b.engine.sync(&notes(), &alice()).await;

        // B deletes n1 and merges it upstream
        let mut gone = note("n1", "one");
        gone.mark_deleted(later(5_000));
        write(&b, &gone).await;
        let merged = b.engine.force_merge(&notes(), &alice()).await;
        assert_eq!(merged.action, SyncAction::Merged);

        // A merges and learns of the deletion
        let merged = a.engine.force_merge(&notes(), &alice()).await;
        assert_eq!(merged.action, SyncAction::Merged);
        assert_eq!(live_keys(&a).await, vec!["n2"]);
        assert_eq!(live_keys(&b).await, vec!["n2"]);
    }

    #[tokio::test]
    async fn test_force_merge_without_snapshot_publishes_local() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let a = device(&blobs).await;
        write(&a, &note("n1", "hello")).await;

        let report = a.engine.force_merge(&notes(), &alice()).await;
        assert_eq!(report.action, SyncAction::Merged);

        let snapshot = a
            .engine
            .remote()
            .get_snapshot(&alice(), &notes())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.records.len(), 1);
    }

    #[tokio::test]
    async fn test_force_download_without_snapshot_is_no_action() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let a = device(&blobs).await;
        write(&a, &note("n1", "keep")).await;

        let report = a.engine.force_download(&notes(), &alice()).await;
        assert_eq!(report.action, SyncAction::NoActionNeeded);
        assert!(report.is_success());
        assert_eq!(live_keys(&a).await, vec!["n1"]);
        assert!(a.engine.remote().get_marker(&notes(), &alice()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_access_denied_is_reported_not_raised() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let a = device(&blobs).await;
        write(&a, &note("n1", "hello")).await;
        blobs.fail_with(RemoteError::AccessDenied("revoked".into()));

        let report = a.engine.sync(&notes(), &alice()).await;
        assert!(!report.is_success());
        assert_eq!(report.action, SyncAction::NoActionNeeded);
        assert_eq!(report.error.unwrap().kind, FailureKind::AccessDenied);

        // Local data is untouched
        assert_eq!(live_keys(&a).await, vec!["n1"]);
    }

    #[tokio::test]
    async fn test_foreign_snapshot_is_rejected() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let a = device(&blobs).await;
        let bob_note = Record::new(
            RecordKey::new("x").unwrap(),
            notes(),
            Some(OwnerId::new("bob").unwrap()),
            json!({}),
        );
        a.engine
            .remote()
            .put_snapshot(&alice(), &notes(), &Snapshot::new(Timestamp::now(), vec![bob_note]))
            .await
            .unwrap();

        let report = a.engine.force_download(&notes(), &alice()).await;
        assert_eq!(report.error.unwrap().kind, FailureKind::Corrupt);
        assert!(live_keys(&a).await.is_empty());
    }

    #[tokio::test]
    async fn test_cycles_on_one_dataset_serialize() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let a = Arc::new(device(&blobs).await);
        write(&a, &note("n1", "hello")).await;

        let (cls, own) = (notes(), alice());
        let (x, y) = tokio::join!(
            a.engine.force_upload(&cls, &own),
            a.engine.force_merge(&cls, &own),
        );
        assert!(x.is_success());
        assert!(y.is_success());
        assert_eq!(live_keys(&a).await, vec!["n1"]);
    }
}
