//! Remote envelopes: dataset snapshots and device markers

use serde::{Deserialize, Serialize};

use super::newtypes::{DeviceId, Timestamp};
use super::record::Record;

/// Complete serialized record set of one dataset for one owner
///
/// Every upload replaces the previous snapshot wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub last_modified: Timestamp,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl Snapshot {
    pub fn new(last_modified: Timestamp, records: Vec<Record>) -> Self {
        Self {
            last_modified,
            records,
        }
    }

    /// Number of records that are not tombstones
    pub fn live_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_present()).count()
    }
}

/// Which device last believed its local copy was authoritative, and when
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMarker {
    pub last_used_device: DeviceId,
    #[serde(default)]
    pub last_updated: Timestamp,
}

impl DeviceMarker {
    pub fn new(last_used_device: DeviceId, last_updated: Timestamp) -> Self {
        Self {
            last_used_device,
            last_updated,
        }
    }
}
