//! KeepSync Cache - Local record persistence
//!
//! SQLite-based storage for the three record partitions:
//! - Public records (shared, content-addressed)
//! - Private records (per owner, replicated through snapshots)
//! - Metadata records (device identity, last-updated counters)
//!
//! ## Architecture
//!
//! This crate implements the `ILocalStore` port from `keepsync-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with versioned, destructive schema setup
//! - [`SqliteRecordStore`] - Full `ILocalStore` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use keepsync_cache::{DatabasePool, SqliteRecordStore};
//!
//! # async fn example() -> Result<(), keepsync_cache::CacheError> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/keepsync/records.db")).await?;
//! let store = SqliteRecordStore::new(pool);
//! // Use store as ILocalStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

use keepsync_core::ports::StoreError;

pub use pool::{DatabasePool, DatabaseSource, SCHEMA_VERSION};
pub use repository::SqliteRecordStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection, or the pool is gone
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema setup failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be mapped to a record
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                CacheError::ConnectionFailed(e.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                CacheError::SerializationError(e.to_string())
            }
            other => CacheError::QueryFailed(other.to_string()),
        }
    }
}

impl From<CacheError> for StoreError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::ConnectionFailed(msg) | CacheError::MigrationFailed(msg) => {
                StoreError::Unavailable(msg)
            }
            CacheError::QueryFailed(msg) => StoreError::Query(msg),
            CacheError::SerializationError(msg) => StoreError::Serialization(msg),
        }
    }
}
