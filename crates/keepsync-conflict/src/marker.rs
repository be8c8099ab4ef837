//! Device marker decision logic
//!
//! Decides the sync direction for a dataset by comparing the remote device
//! marker with this device's identity and its Last-Updated Counter.
//!
//! This is last-writer-wins arbitration, not a vector clock. Two devices
//! racing inside one cycle resolve to whichever reads the marker second.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use keepsync_core::domain::{DeviceId, DeviceMarker, Timestamp};

/// Default window inside which two counters are considered equal
pub const DEFAULT_CLOCK_SKEW_TOLERANCE: Duration = Duration::from_millis(1000);

/// Direction chosen for one sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Local data is authoritative
    Upload,
    /// Remote data is authoritative
    Download,
    /// Both sides already agree
    NoAction,
}

impl fmt::Display for SyncDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncDecision::Upload => "upload",
            SyncDecision::Download => "download",
            SyncDecision::NoAction => "no_action",
        };
        f.write_str(s)
    }
}

/// Compares markers to choose a [`SyncDecision`]
#[derive(Debug, Clone, Copy)]
pub struct MarkerDecider {
    tolerance: Duration,
}

impl Default for MarkerDecider {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_SKEW_TOLERANCE)
    }
}

impl MarkerDecider {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Chooses the sync direction
    ///
    /// - no remote marker: this device syncs first, upload
    /// - same device, counters within tolerance: nothing to do
    /// - same device, remote newer: download
    /// - same device, local newer: upload
    /// - another device wrote last: download
    pub fn decide(
        &self,
        remote: Option<&DeviceMarker>,
        device: DeviceId,
        local_last_updated: Timestamp,
    ) -> SyncDecision {
        let Some(marker) = remote else {
            debug!(%device, "No remote marker, first device to sync");
            return SyncDecision::Upload;
        };

        if marker.last_used_device != device {
            debug!(
                %device,
                remote_device = %marker.last_used_device,
                "Another device wrote last"
            );
            return SyncDecision::Download;
        }

        let drift = marker.last_updated.abs_diff(local_last_updated);
        if u128::from(drift) < self.tolerance.as_millis() {
            debug!(drift_ms = drift, "Markers agree within tolerance");
            SyncDecision::NoAction
        } else if marker.last_updated > local_last_updated {
            SyncDecision::Download
        } else {
            SyncDecision::Upload
        }
    }
}
