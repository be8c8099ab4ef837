//! In-process blob store
//!
//! Backs tests and offline use. Several [`crate::RemoteFacade`]s can share
//! one instance through an `Arc` to simulate multiple devices talking to
//! the same remote. A failure can be injected to exercise error paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;

use keepsync_core::ports::{IBlobStore, RemoteError};

use crate::paths;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Thread-safe in-memory object store
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: DashMap<String, StoredObject>,
    failure: Mutex<Option<RemoteError>>,
    puts: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with `error` until cleared
    pub fn fail_with(&self, error: RemoteError) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = Some(error);
        }
    }

    pub fn clear_failure(&self) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = None;
        }
    }

    /// Number of successful `put` calls so far
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Acquire)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.contains_key(path)
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects.get(path).map(|o| o.content_type.clone())
    }

    /// Every stored path, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    fn check(&self, path: &str) -> Result<(), RemoteError> {
        paths::validate(path)?;
        match self.failure.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            },
            Err(_) => Err(RemoteError::Transient("failure slot poisoned".into())),
        }
    }
}

#[async_trait::async_trait]
impl IBlobStore for MemoryBlobStore {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        self.check(path)?;
        Ok(self.objects.get(path).map(|o| o.bytes.clone()))
    }

    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemoteError> {
        self.check(path)?;
        self.objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        self.puts.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        self.check(path)?;
        self.objects.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.get("a/b").await.unwrap(), None);

        store
            .put("a/b", b"hello".to_vec(), "application/json")
            .await
            .unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(store.content_type("a/b").as_deref(), Some("application/json"));
        assert_eq!(store.put_count(), 1);

        store.delete("a/b").await.unwrap();
        store.delete("a/b").await.unwrap();
        assert!(!store.contains("a/b"));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryBlobStore::new();
        store.fail_with(RemoteError::AccessDenied("revoked".into()));
        let err = store.get("a/b").await.unwrap_err();
        assert!(err.is_access_denied());

        store.clear_failure();
        assert!(store.get("a/b").await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_path_rejected() {
        let store = MemoryBlobStore::new();
        let err = store.put("../x", vec![], "text/plain").await.unwrap_err();
        assert!(matches!(err, RemoteError::InvalidPath(_)));
    }
}
