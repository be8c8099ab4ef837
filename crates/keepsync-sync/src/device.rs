//! Device identity and the last-updated counter
//!
//! Both live as records in the metadata partition:
//!
//! | key           | owner | meaning                                   |
//! |---------------|-------|-------------------------------------------|
//! | `deviceKey`   | none  | this device's id for the dataset          |
//! | `lastUpdated` | owner | time of the owner's last local mutation   |
//!
//! A device id is generated lazily on first use and never regenerated while
//! the metadata partition survives.

use serde_json::json;
use tracing::{debug, info};

use keepsync_core::domain::{DatasetId, DeviceId, OwnerId, Partition, Record, RecordKey, Timestamp};
use keepsync_core::ports::{RecordFilter, StoreError};

use crate::store::RecordStore;

/// Metadata key of the per-dataset device id
pub const DEVICE_KEY: &str = "deviceKey";

/// Metadata key of the per-owner last-updated counter
pub const COUNTER_KEY: &str = "lastUpdated";

fn metadata_key(name: &str) -> Result<RecordKey, StoreError> {
    RecordKey::new(name).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// This device's id for `dataset`, created and persisted on first call
pub async fn device_id(store: &RecordStore, dataset: &DatasetId) -> Result<DeviceId, StoreError> {
    let key = metadata_key(DEVICE_KEY)?;
    if let Some(record) = store.get(Partition::Metadata, dataset, None, &key).await? {
        let raw = record
            .payload()
            .get("deviceId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StoreError::Serialization(format!("{dataset}: device record has no id")))?;
        return raw
            .parse()
            .map_err(|e| StoreError::Serialization(format!("{dataset}: {e}")));
    }

    let id = DeviceId::new();
    let record = Record::new(key, dataset.clone(), None, json!({ "deviceId": id.to_string() }));
    store.write(Partition::Metadata, &record).await?;
    info!(%dataset, device = %id, "Generated device identity");
    Ok(id)
}

/// The owner's last-updated counter for `dataset`; zero if never written
pub async fn last_updated(
    store: &RecordStore,
    dataset: &DatasetId,
    owner: &OwnerId,
) -> Result<Timestamp, StoreError> {
    let key = metadata_key(COUNTER_KEY)?;
    Ok(store
        .get(Partition::Metadata, dataset, Some(owner), &key)
        .await?
        .map(|r| r.last_modified())
        .unwrap_or_default())
}

pub async fn set_last_updated(
    store: &RecordStore,
    dataset: &DatasetId,
    owner: &OwnerId,
    at: Timestamp,
) -> Result<(), StoreError> {
    let key = metadata_key(COUNTER_KEY)?;
    let record = Record::new_at(
        key,
        dataset.clone(),
        Some(owner.clone()),
        json!({ "lastUpdated": at.as_millis() }),
        at,
    );
    store.write(Partition::Metadata, &record).await?;
    debug!(%dataset, last_updated = at.as_millis(), "Updated last-updated counter");
    Ok(())
}

/// Forgets last-updated counters, for one owner or for every owner
///
/// Device ids are kept.
pub async fn clear_counters(store: &RecordStore, owner: Option<&OwnerId>) -> Result<u64, StoreError> {
    let filter = match owner {
        Some(owner) => RecordFilter::new().with_owner(owner.clone()),
        None => RecordFilter::new(),
    };
    let mut removed = 0;
    for record in store.query(Partition::Metadata, &filter).await? {
        if record.key().as_str() != COUNTER_KEY || record.owner_id().is_none() {
            continue;
        }
        if store
            .delete(
                Partition::Metadata,
                record.data_type(),
                record.owner_id(),
                record.key(),
                crate::store::Propagation::Silent,
            )
            .await?
        {
            removed += 1;
        }
    }
    Ok(removed)
}
