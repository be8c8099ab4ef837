//! Record domain entity
//!
//! A [`Record`] is the unit of storage: an opaque JSON payload wrapped in
//! the bookkeeping envelope the synchronizer needs (ownership, parent link,
//! access and modification times, tombstone flag).
//!
//! ## Lifecycle
//!
//! ```text
//!   new() ──► present ──update_payload()──► present
//!                │
//!                └──mark_deleted()──► tombstone ──(purge)──► physically removed
//! ```
//!
//! `created_at` is fixed at construction; updates only move `last_modified`
//! and `last_read`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::newtypes::{DatasetId, OwnerId, RecordKey, Timestamp};

// ============================================================================
// Partition
// ============================================================================

/// Local storage partition a record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Shared data, dual-written to local and remote
    Public,
    /// Per-owner data, replicated through snapshots
    Private,
    /// Per-owner bookkeeping (device identity, counters)
    Metadata,
}

impl Partition {
    /// All partitions, in creation order
    pub const ALL: [Partition; 3] = [Partition::Public, Partition::Private, Partition::Metadata];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Public => "public",
            Partition::Private => "private",
            Partition::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Record
// ============================================================================

/// A stored record: payload plus synchronization envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    key: RecordKey,
    #[serde(default)]
    owner_id: Option<OwnerId>,
    #[serde(default, deserialize_with = "empty_as_none")]
    parent_id: Option<String>,
    #[serde(default)]
    last_read: Timestamp,
    #[serde(default)]
    last_modified: Timestamp,
    #[serde(default)]
    created_at: Timestamp,
    data_type: DatasetId,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    payload: serde_json::Value,
}

impl Record {
    /// Creates a new live record stamped with the current time
    pub fn new(
        key: RecordKey,
        data_type: DatasetId,
        owner_id: Option<OwnerId>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new_at(key, data_type, owner_id, payload, Timestamp::now())
    }

    /// Creates a new live record with every timestamp set to `now`
    pub fn new_at(
        key: RecordKey,
        data_type: DatasetId,
        owner_id: Option<OwnerId>,
        payload: serde_json::Value,
        now: Timestamp,
    ) -> Self {
        Self {
            key,
            owner_id,
            parent_id: None,
            last_read: now,
            last_modified: now,
            created_at: now,
            data_type,
            deleted: false,
            payload,
        }
    }

    /// Sets the parent entity reference (empty string clears it)
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        let parent_id = parent_id.into();
        self.parent_id = if parent_id.is_empty() {
            None
        } else {
            Some(parent_id)
        };
        self
    }

    // --- Getters ---

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn owner_id(&self) -> Option<&OwnerId> {
        self.owner_id.as_ref()
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn last_read(&self) -> Timestamp {
        self.last_read
    }

    pub fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn data_type(&self) -> &DatasetId {
        &self.data_type
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Live records are the only ones reads and merges treat as data
    pub fn is_present(&self) -> bool {
        !self.deleted
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    // --- Mutations ---

    /// Records a read access
    pub fn touch_read(&mut self, now: Timestamp) {
        self.last_read = now;
    }

    /// Replaces the payload and moves the modification time
    pub fn update_payload(&mut self, payload: serde_json::Value, now: Timestamp) {
        self.payload = payload;
        self.last_modified = now;
        self.last_read = now;
    }

    /// Turns the record into a tombstone
    ///
    /// The tombstone keeps its key so the deletion can be replicated; its
    /// modification time moves forward so it wins the next merge.
    pub fn mark_deleted(&mut self, now: Timestamp) {
        self.deleted = true;
        self.last_modified = now;
    }

    /// Overrides the last access time
    pub fn set_last_read(&mut self, ts: Timestamp) {
        self.last_read = ts;
    }

    /// Overrides the modification time
    pub fn set_last_modified(&mut self, ts: Timestamp) {
        self.last_modified = ts;
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample(now: i64) -> Record {
        Record::new_at(
            RecordKey::new("k1").unwrap(),
            DatasetId::new("messages").unwrap(),
            Some(OwnerId::new("alice").unwrap()),
            json!({"text": "hello"}),
            Timestamp::from_millis(now),
        )
    }

    #[test]
    fn test_new_sets_all_timestamps() {
        let r = sample(1_000);
        assert_eq!(r.created_at().as_millis(), 1_000);
        assert_eq!(r.last_modified().as_millis(), 1_000);
        assert_eq!(r.last_read().as_millis(), 1_000);
        assert!(r.is_present());
    }

    #[test]
    fn test_update_keeps_created_at() {
        let mut r = sample(1_000);
        r.update_payload(json!({"text": "bye"}), Timestamp::from_millis(5_000));
        assert_eq!(r.created_at().as_millis(), 1_000);
        assert_eq!(r.last_modified().as_millis(), 5_000);
        assert_eq!(r.payload()["text"], "bye");
    }

    #[test]
    fn test_mark_deleted() {
        let mut r = sample(1_000);
        r.mark_deleted(Timestamp::from_millis(2_000));
        assert!(r.is_deleted());
        assert!(!r.is_present());
        assert_eq!(r.last_modified().as_millis(), 2_000);
    }

    #[test]
    fn test_with_parent_empty_clears() {
        let r = sample(0).with_parent("conv-1").with_parent("");
        assert_eq!(r.parent_id(), None);
    }

    #[test]
    fn test_serialize_camel_case() {
        let r = sample(42).with_parent("conv-1");
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["ownerId"], "alice");
        assert_eq!(value["parentId"], "conv-1");
        assert_eq!(value["lastModified"], 42);
        assert_eq!(value["dataType"], "messages");
    }

    #[test]
    fn test_missing_last_modified_defaults_to_zero() {
        let r: Record = serde_json::from_value(json!({
            "key": "k1",
            "dataType": "messages",
            "parentId": "",
            "payload": {"a": 1}
        }))
        .unwrap();
        assert_eq!(r.last_modified(), Timestamp::default());
        assert_eq!(r.parent_id(), None);
        assert!(r.owner_id().is_none());
        assert!(!r.is_deleted());
    }

    #[test]
    fn test_partition_names() {
        assert_eq!(Partition::Public.to_string(), "public");
        assert_eq!(Partition::ALL.len(), 3);
    }
}
