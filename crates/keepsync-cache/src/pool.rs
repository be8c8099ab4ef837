//! Database connection pool management
//!
//! Provides a wrapper around SQLx's SqlitePool with:
//! - Automatic directory creation for database files
//! - WAL journal mode for concurrent reads
//! - Versioned schema: a version mismatch drops and recreates every partition
//! - In-memory mode for testing

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

const CREATE_SQL: &str = include_str!("migrations/schema.sql");
const DROP_SQL: &str = include_str!("migrations/drop.sql");

/// Where a pool's database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSource {
    File(PathBuf),
    Memory,
}

/// Manages a pool of SQLite connections for record persistence
///
/// The pool is configured with:
/// - WAL journal mode for concurrent read access
/// - 5 max connections for file-based databases
/// - 1 never-recycled connection for in-memory databases (the data lives
///   in that connection)
/// - 5-second busy timeout to handle write contention
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
    source: DatabaseSource,
}

impl DatabasePool {
    /// Creates a new database pool connected to the specified file
    ///
    /// Creates parent directories and the database file when missing, then
    /// brings the schema to [`SCHEMA_VERSION`].
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established,
    /// or `CacheError::MigrationFailed` if the schema cannot be created.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::ensure_schema(&pool).await?;

        tracing::info!(
            path = %db_path.display(),
            "Database pool initialized"
        );

        Ok(Self {
            pool,
            source: DatabaseSource::File(db_path.to_path_buf()),
        })
    }

    /// Creates an in-memory database pool for testing
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established,
    /// or `CacheError::MigrationFailed` if the schema cannot be created.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::ensure_schema(&pool).await?;

        tracing::debug!("In-memory database pool initialized");

        Ok(Self {
            pool,
            source: DatabaseSource::Memory,
        })
    }

    /// Opens a fresh pool on the same source
    ///
    /// An in-memory source yields a new, empty database.
    pub async fn reopen(&self) -> Result<Self, CacheError> {
        match self.source {
            DatabaseSource::File(ref path) => Self::new(path).await,
            DatabaseSource::Memory => Self::in_memory().await,
        }
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn source(&self) -> &DatabaseSource {
        &self.source
    }

    /// Closes every connection; later queries fail with `PoolClosed`
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Reads the stored schema version (0 for a fresh database)
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        Self::read_version(&self.pool).await
    }

    /// Drops and recreates every partition
    pub async fn recreate(&self) -> Result<(), CacheError> {
        Self::rebuild(&self.pool).await
    }

    async fn read_version(pool: &SqlitePool) -> Result<i64, CacheError> {
        sqlx::query_scalar::<_, i64>("PRAGMA user_version")
            .fetch_one(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("Failed to read schema version: {e}")))
    }

    /// Creates the schema, rebuilding it when the stored version differs
    async fn ensure_schema(pool: &SqlitePool) -> Result<(), CacheError> {
        let version = Self::read_version(pool).await?;
        if version == SCHEMA_VERSION {
            sqlx::raw_sql(CREATE_SQL).execute(pool).await.map_err(|e| {
                CacheError::MigrationFailed(format!("Failed to verify schema: {e}"))
            })?;
            tracing::debug!(version, "Database schema up to date");
            return Ok(());
        }

        if version != 0 {
            tracing::warn!(
                found = version,
                expected = SCHEMA_VERSION,
                "Schema version changed, dropping all partitions"
            );
        }
        Self::rebuild(pool).await
    }

    async fn rebuild(pool: &SqlitePool) -> Result<(), CacheError> {
        let script = format!("{DROP_SQL}\n{CREATE_SQL}\nPRAGMA user_version = {SCHEMA_VERSION};");
        sqlx::raw_sql(&script)
            .execute(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("Failed to create schema: {e}")))?;

        tracing::debug!(version = SCHEMA_VERSION, "Database schema created");
        Ok(())
    }
}
