//! Remote facade
//!
//! Wraps an [`IBlobStore`] with the object layout from [`crate::paths`],
//! JSON envelope encoding and the per-dataset payload validation gate.
//! A payload that fails validation is never sent.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use keepsync_core::config::MarkerScope;
use keepsync_core::domain::{DatasetId, DeviceMarker, OwnerId, Record, RecordKey, Snapshot};
use keepsync_core::ports::{IBlobStore, RemoteError};
use keepsync_core::validation::Validator;

use crate::{paths, RemoteFacadeError};

/// Content type of every envelope written by the facade
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Typed access to snapshots, device markers and public records
#[derive(Clone)]
pub struct RemoteFacade {
    store: Arc<dyn IBlobStore>,
    validator: Validator,
    marker_scope: MarkerScope,
}

impl RemoteFacade {
    pub fn new(store: Arc<dyn IBlobStore>, validator: Validator, marker_scope: MarkerScope) -> Self {
        Self {
            store,
            validator,
            marker_scope,
        }
    }

    pub fn marker_scope(&self) -> MarkerScope {
        self.marker_scope
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    // ------------------------------------------------------------------
    // Raw blobs
    // ------------------------------------------------------------------

    /// Fetches raw bytes; `Ok(None)` means there is no remote state yet
    pub async fn get_blob(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteFacadeError> {
        self.store.get(path).await.map_err(|e| log_remote(path, e))
    }

    pub async fn put_blob(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemoteFacadeError> {
        self.store
            .put(path, bytes, content_type)
            .await
            .map_err(|e| log_remote(path, e))
    }

    pub async fn delete_blob(&self, path: &str) -> Result<(), RemoteFacadeError> {
        self.store.delete(path).await.map_err(|e| log_remote(path, e))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, RemoteFacadeError> {
        let Some(bytes) = self.get_blob(path).await? else {
            debug!(path, "No remote object");
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RemoteFacadeError::Envelope(format!("{path}: {e}")))
    }

    async fn put_json<T: Serialize>(&self, path: &str, value: &T) -> Result<(), RemoteFacadeError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| RemoteFacadeError::Envelope(format!("{path}: {e}")))?;
        self.put_blob(path, bytes, JSON_CONTENT_TYPE).await
    }

    fn check_payload(&self, record: &Record) -> Result<(), RemoteFacadeError> {
        if !record.is_present() || !self.validator.requires_validation(record.data_type()) {
            return Ok(());
        }
        self.validator
            .validate(record.data_type(), record.payload())
            .map_err(|e| {
                warn!(dataset = %record.data_type(), key = %record.key(), error = %e, "Refusing to upload invalid record");
                RemoteFacadeError::Validation(e.to_string())
            })
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub async fn get_snapshot(
        &self,
        owner: &OwnerId,
        dataset: &DatasetId,
    ) -> Result<Option<Snapshot>, RemoteFacadeError> {
        self.get_json(&paths::snapshot(owner, dataset)).await
    }

    /// Replaces the owner's snapshot of `dataset`
    ///
    /// # Errors
    /// `Validation` if any live record fails its dataset's rules; nothing
    /// is uploaded in that case
    pub async fn put_snapshot(
        &self,
        owner: &OwnerId,
        dataset: &DatasetId,
        snapshot: &Snapshot,
    ) -> Result<(), RemoteFacadeError> {
        for record in &snapshot.records {
            self.check_payload(record)?;
        }
        let path = paths::snapshot(owner, dataset);
        self.put_json(&path, snapshot).await?;
        debug!(
            %dataset,
            records = snapshot.records.len(),
            last_modified = snapshot.last_modified.as_millis(),
            "Uploaded snapshot"
        );
        Ok(())
    }

    pub async fn delete_snapshot(
        &self,
        owner: &OwnerId,
        dataset: &DatasetId,
    ) -> Result<(), RemoteFacadeError> {
        self.delete_blob(&paths::snapshot(owner, dataset)).await
    }

    // ------------------------------------------------------------------
    // Device markers
    // ------------------------------------------------------------------

    pub async fn get_marker(
        &self,
        dataset: &DatasetId,
        owner: &OwnerId,
    ) -> Result<Option<DeviceMarker>, RemoteFacadeError> {
        self.get_json(&paths::device_marker(self.marker_scope, dataset, owner))
            .await
    }

    pub async fn put_marker(
        &self,
        dataset: &DatasetId,
        owner: &OwnerId,
        marker: &DeviceMarker,
    ) -> Result<(), RemoteFacadeError> {
        self.put_json(&paths::device_marker(self.marker_scope, dataset, owner), marker)
            .await
    }

    // ------------------------------------------------------------------
    // Public records
    // ------------------------------------------------------------------

    pub async fn get_public_record(
        &self,
        dataset: &DatasetId,
        key: &RecordKey,
    ) -> Result<Option<Record>, RemoteFacadeError> {
        self.get_json(&paths::public_record(dataset, key)).await
    }

    pub async fn put_public_record(&self, record: &Record) -> Result<(), RemoteFacadeError> {
        self.check_payload(record)?;
        self.put_json(&paths::public_record(record.data_type(), record.key()), record)
            .await
    }

    pub async fn delete_public_record(
        &self,
        dataset: &DatasetId,
        key: &RecordKey,
    ) -> Result<(), RemoteFacadeError> {
        self.delete_blob(&paths::public_record(dataset, key)).await
    }
}

fn log_remote(path: &str, err: RemoteError) -> RemoteFacadeError {
    match err {
        RemoteError::AccessDenied(_) => error!(path, error = %err, "Remote access denied"),
        _ => warn!(path, error = %err, "Remote operation failed"),
    }
    RemoteFacadeError::Remote(err)
}
