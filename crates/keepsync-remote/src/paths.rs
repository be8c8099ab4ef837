//! Remote object path layout
//!
//! ```text
//! public/<dataset>/<contentHash>                      public records
//! private/snapshot/<ownerOpaqueId>/<dataset>          per-owner snapshots
//! public/metadata/deviceKey/<dataset>[/<ownerOpaqueId>] device markers
//! ```

use keepsync_core::config::MarkerScope;
use keepsync_core::domain::{DatasetId, OwnerId, RecordKey};
use keepsync_core::keys::owner_opaque_id;
use keepsync_core::ports::RemoteError;

/// Object path of a public record
pub fn public_record(dataset: &DatasetId, key: &RecordKey) -> String {
    format!("public/{dataset}/{key}")
}

/// Object path of an owner's snapshot of one dataset
pub fn snapshot(owner: &OwnerId, dataset: &DatasetId) -> String {
    format!("private/snapshot/{}/{dataset}", owner_opaque_id(owner))
}

/// Object path of the device marker for a dataset
pub fn device_marker(scope: MarkerScope, dataset: &DatasetId, owner: &OwnerId) -> String {
    match scope {
        MarkerScope::PerOwner => format!(
            "public/metadata/deviceKey/{dataset}/{}",
            owner_opaque_id(owner)
        ),
        MarkerScope::PerDataset => format!("public/metadata/deviceKey/{dataset}"),
    }
}

/// Rejects paths that could escape the store's namespace
///
/// # Errors
/// Returns `RemoteError::InvalidPath` for empty, absolute, traversing or
/// double-slash paths
pub fn validate(path: &str) -> Result<(), RemoteError> {
    if path.is_empty() {
        return Err(RemoteError::InvalidPath("empty path".into()));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(RemoteError::InvalidPath(format!(
            "path must be relative without trailing slash: {path}"
        )));
    }
    if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(RemoteError::InvalidPath(format!(
            "path contains an empty or relative segment: {path}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ds() -> DatasetId {
        DatasetId::new("messages").unwrap()
    }

    fn alice() -> OwnerId {
        OwnerId::new("alice").unwrap()
    }

    #[test]
    fn test_public_record_path() {
        let key = RecordKey::new("abc").unwrap();
        assert_eq!(public_record(&ds(), &key), "public/messages/abc");
    }

    #[test]
    fn test_snapshot_path_hides_owner() {
        let path = snapshot(&alice(), &ds());
        assert!(path.starts_with("private/snapshot/"));
        assert!(path.ends_with("/messages"));
        assert!(!path.contains("alice"));
    }

    #[test]
    fn test_marker_scopes() {
        let per_dataset = device_marker(MarkerScope::PerDataset, &ds(), &alice());
        assert_eq!(per_dataset, "public/metadata/deviceKey/messages");

        let per_owner = device_marker(MarkerScope::PerOwner, &ds(), &alice());
        assert!(per_owner.starts_with("public/metadata/deviceKey/messages/"));
        assert_ne!(
            per_owner,
            device_marker(MarkerScope::PerOwner, &ds(), &OwnerId::new("bob").unwrap())
        );
    }

    #[test]
    fn test_validate() {
        assert!(validate("public/messages/abc").is_ok());
        assert!(validate("").is_err());
        assert!(validate("/abs").is_err());
        assert!(validate("a//b").is_err());
        assert!(validate("a/../b").is_err());
        assert!(validate("a/b/").is_err());
    }

    #[test]
    fn test_generated_paths_are_valid() {
        let key = RecordKey::new("abc").unwrap();
        assert!(validate(&public_record(&ds(), &key)).is_ok());
        assert!(validate(&snapshot(&alice(), &ds())).is_ok());
        assert!(validate(&device_marker(MarkerScope::PerOwner, &ds(), &alice())).is_ok());
    }
}
