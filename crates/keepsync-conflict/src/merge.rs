//! Snapshot merge engine
//!
//! Reconciles a remote snapshot with the local record set of the same
//! (dataset, owner) slice. Per key, the copy with the strictly greater
//! `last_modified` wins and the remote copy wins ties. The result depends
//! only on the two inputs.
//!
//! ## Tombstones
//!
//! - A tombstone with no counterpart on the other side is dropped.
//! - A tombstone that wins against a counterpart is kept in
//!   [`MergeOutcome::records`] so the deletion reaches the other replicas,
//!   but it is never part of [`MergeOutcome::present`].
//! - A key whose winning copy is a tombstone is absent from the live set.
//!
//! Keeping winning tombstones makes the merge idempotent:
//! `merge(S, merge(S, L)) == merge(S, L)`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::{debug, trace};

use keepsync_core::domain::{DatasetId, OwnerId, Record, RecordKey, Snapshot};

use crate::error::ConflictError;

/// Counters describing how a merge resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Keys where the local copy won
    pub local_wins: usize,
    /// Keys where the remote copy won, ties included
    pub remote_wins: usize,
    /// Keys only present locally and kept
    pub local_only: usize,
    /// Keys only present remotely and kept
    pub remote_only: usize,
    /// Tombstones dropped because nothing needed them
    pub dropped_tombstones: usize,
}

/// Result of merging a remote snapshot with local records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Merged records sorted by key, winning tombstones included
    pub records: Vec<Record>,
    pub stats: MergeStats,
}

impl MergeOutcome {
    /// Merged records that are live data
    pub fn present(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_present())
    }

    pub fn present_count(&self) -> usize {
        self.present().count()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Merges a remote snapshot with the local records of one slice
///
/// # Errors
/// Returns `ConflictError::MixedSlice` if the inputs span more than one
/// (dataset, owner) pair, or `DuplicateKey` if one side lists a key twice.
pub fn merge(remote: &Snapshot, local: &[Record]) -> Result<MergeOutcome, ConflictError> {
    merge_records(&remote.records, local)
}

/// [`merge`] over bare record lists
pub fn merge_records(remote: &[Record], local: &[Record]) -> Result<MergeOutcome, ConflictError> {
    check_slice(remote.iter().chain(local.iter()))?;
    let remote_by_key = index(remote, "remote")?;
    let local_by_key = index(local, "local")?;

    let mut stats = MergeStats::default();
    let mut merged: BTreeMap<RecordKey, Record> = BTreeMap::new();

    for (key, local_record) in &local_by_key {
        match remote_by_key.get(key) {
            None => {
                if local_record.is_present() {
                    stats.local_only += 1;
                    merged.insert((*key).clone(), (*local_record).clone());
                } else {
                    trace!(%key, "Dropping local-only tombstone");
                    stats.dropped_tombstones += 1;
                }
            }
            Some(remote_record) => {
                let winner = if local_record.last_modified() > remote_record.last_modified() {
                    stats.local_wins += 1;
                    *local_record
                } else {
                    stats.remote_wins += 1;
                    *remote_record
                };
                merged.insert((*key).clone(), winner.clone());
            }
        }
    }

    for (key, remote_record) in &remote_by_key {
        if let Entry::Vacant(slot) = merged.entry((*key).clone()) {
            if remote_record.is_present() {
                stats.remote_only += 1;
                slot.insert((*remote_record).clone());
            } else {
                trace!(%key, "Dropping remote-only tombstone");
                stats.dropped_tombstones += 1;
            }
        }
    }

    debug!(
        remote = remote.len(),
        local = local.len(),
        merged = merged.len(),
        local_wins = stats.local_wins,
        remote_wins = stats.remote_wins,
        "Merged record sets"
    );

    Ok(MergeOutcome {
        records: merged.into_values().collect(),
        stats,
    })
}

fn check_slice<'a>(records: impl Iterator<Item = &'a Record>) -> Result<(), ConflictError> {
    let mut expected: Option<(&DatasetId, Option<&OwnerId>)> = None;
    for record in records {
        let slice = (record.data_type(), record.owner_id());
        match expected {
            None => expected = Some(slice),
            Some(first) if first == slice => {}
            Some((dataset, owner)) => {
                return Err(ConflictError::MixedSlice {
                    expected: describe(dataset, owner),
                    found: describe(slice.0, slice.1),
                });
            }
        }
    }
    Ok(())
}

fn describe(dataset: &DatasetId, owner: Option<&OwnerId>) -> String {
    match owner {
        Some(owner) => format!("{dataset}/{owner}"),
        None => format!("{dataset}/<public>"),
    }
}

fn index<'a>(
    records: &'a [Record],
    side: &'static str,
) -> Result<BTreeMap<&'a RecordKey, &'a Record>, ConflictError> {
    let mut by_key = BTreeMap::new();
    for record in records {
        if by_key.insert(record.key(), record).is_some() {
            return Err(ConflictError::DuplicateKey {
                side,
                key: record.key().to_string(),
            });
        }
    }
    Ok(by_key)
}
