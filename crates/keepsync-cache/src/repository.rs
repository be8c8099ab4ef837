//! SQLite implementation of ILocalStore
//!
//! Each [`Partition`] maps to its own table with an identical layout. This
//! module handles row mapping and dynamic query construction from a
//! [`RecordFilter`].
//!
//! ## Type Mapping
//!
//! | Domain Type        | SQL Type | Strategy                                   |
//! |--------------------|----------|--------------------------------------------|
//! | DatasetId          | TEXT     | `.as_str()` / `DatasetId::new()`           |
//! | OwnerId (optional) | TEXT     | `''` for `None`                            |
//! | RecordKey          | TEXT     | `.as_str()` / `RecordKey::new()`           |
//! | Timestamp          | INTEGER  | epoch milliseconds                         |
//! | bool               | INTEGER  | 0 / 1                                      |
//! | payload            | TEXT     | serde_json serialization                   |

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;

use keepsync_core::domain::{DatasetId, OwnerId, Partition, Record, RecordKey, Timestamp};
use keepsync_core::ports::{ILocalStore, RecordFilter, StoreError};

use crate::{CacheError, DatabasePool};

/// SQLite-based implementation of the local store port
///
/// The pool sits behind a lock so [`ILocalStore::reinitialize`] can swap in
/// a freshly opened one while other tasks hold clones of the old handle.
pub struct SqliteRecordStore {
    pool: RwLock<DatabasePool>,
}

impl SqliteRecordStore {
    /// Creates a new store on top of an opened pool
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            pool: RwLock::new(pool),
        }
    }

    /// Handle to the current connection pool
    async fn conn(&self) -> SqlitePool {
        self.pool.read().await.pool().clone()
    }

    /// Closes the current pool, simulating a lost connection
    pub async fn close(&self) {
        self.pool.read().await.close().await;
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn table(partition: Partition) -> &'static str {
    match partition {
        Partition::Public => "public_records",
        Partition::Private => "private_records",
        Partition::Metadata => "metadata_records",
    }
}

fn owner_column(owner: Option<&OwnerId>) -> &str {
    owner.map(OwnerId::as_str).unwrap_or("")
}

/// Reconstruct a Record from a database row
fn record_from_row(row: &SqliteRow) -> Result<Record, CacheError> {
    let data_type: String = row.try_get("data_type")?;
    let owner_id: String = row.try_get("owner_id")?;
    let key: String = row.try_get("key")?;
    let parent_id: Option<String> = row.try_get("parent_id")?;
    let last_read: i64 = row.try_get("last_read")?;
    let last_modified: i64 = row.try_get("last_modified")?;
    let created_at: i64 = row.try_get("created_at")?;
    let deleted: bool = row.try_get("deleted")?;
    let payload_str: String = row.try_get("payload")?;

    let dataset = DatasetId::new(data_type.as_str()).map_err(|e| {
        CacheError::SerializationError(format!("Invalid data_type '{}': {}", data_type, e))
    })?;
    let key = RecordKey::new(key.as_str())
        .map_err(|e| CacheError::SerializationError(format!("Invalid key '{}': {}", key, e)))?;
    let owner = if owner_id.is_empty() {
        None
    } else {
        Some(OwnerId::new(owner_id.as_str()).map_err(|e| {
            CacheError::SerializationError(format!("Invalid owner_id '{}': {}", owner_id, e))
        })?)
    };
    let payload: serde_json::Value = serde_json::from_str(&payload_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid payload for key '{}': {}", key, e))
    })?;

    let mut record = Record::new_at(key, dataset, owner, payload, Timestamp::from_millis(created_at))
        .with_parent(parent_id.unwrap_or_default());
    record.set_last_read(Timestamp::from_millis(last_read));
    record.set_last_modified(Timestamp::from_millis(last_modified));
    if deleted {
        record.mark_deleted(Timestamp::from_millis(last_modified));
    }
    Ok(record)
}

/// A bind value for dynamically built queries
enum Bind {
    Text(String),
    Int(i64),
}

/// Translates a filter into a WHERE clause and its bind values
fn where_clause(filter: &RecordFilter) -> (String, Vec<Bind>) {
    let mut sql = String::from(" WHERE 1=1");
    let mut binds = Vec::new();

    if let Some(ref dataset) = filter.dataset {
        sql.push_str(" AND data_type = ?");
        binds.push(Bind::Text(dataset.as_str().to_string()));
    }
    if let Some(ref dataset) = filter.exclude_dataset {
        sql.push_str(" AND data_type <> ?");
        binds.push(Bind::Text(dataset.as_str().to_string()));
    }
    if let Some(ref owner) = filter.owner {
        sql.push_str(" AND owner_id = ?");
        binds.push(Bind::Text(owner.as_str().to_string()));
    }
    if let Some(ref owner) = filter.exclude_owner {
        sql.push_str(" AND owner_id <> ?");
        binds.push(Bind::Text(owner.as_str().to_string()));
    }
    if let Some(cutoff) = filter.last_read_before {
        sql.push_str(" AND last_read < ?");
        binds.push(Bind::Int(cutoff.as_millis()));
    }
    if filter.has_parent {
        sql.push_str(" AND parent_id IS NOT NULL AND parent_id <> ''");
    }
    if filter.live_only {
        sql.push_str(" AND deleted = 0");
    }

    (sql, binds)
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    binds: &'q [Bind],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Text(s) => query.bind(s.as_str()),
            Bind::Int(i) => query.bind(*i),
        };
    }
    query
}

fn insert_sql(partition: Partition) -> String {
    format!(
        "INSERT OR REPLACE INTO {} \
         (data_type, owner_id, key, parent_id, last_read, last_modified, \
          created_at, deleted, payload) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        table(partition)
    )
}

async fn insert_record<'e, E>(executor: E, partition: Partition, record: &Record) -> Result<(), CacheError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let payload = serde_json::to_string(record.payload())
        .map_err(|e| CacheError::SerializationError(format!("Failed to serialize payload: {e}")))?;

    sqlx::query(&insert_sql(partition))
        .bind(record.data_type().as_str())
        .bind(owner_column(record.owner_id()))
        .bind(record.key().as_str())
        .bind(record.parent_id())
        .bind(record.last_read().as_millis())
        .bind(record.last_modified().as_millis())
        .bind(record.created_at().as_millis())
        .bind(record.is_deleted())
        .bind(payload)
        .execute(executor)
        .await?;
    Ok(())
}

// ============================================================================
// Inherent operations (adapter-level errors)
// ============================================================================

impl SqliteRecordStore {
    async fn fetch(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
    ) -> Result<Option<Record>, CacheError> {
        let sql = format!(
            "SELECT * FROM {} WHERE data_type = ? AND owner_id = ? AND key = ?",
            table(partition)
        );
        let row = sqlx::query(&sql)
            .bind(dataset.as_str())
            .bind(owner_column(owner))
            .bind(key.as_str())
            .fetch_optional(&self.conn().await)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn remove(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
    ) -> Result<bool, CacheError> {
        let sql = format!(
            "DELETE FROM {} WHERE data_type = ? AND owner_id = ? AND key = ?",
            table(partition)
        );
        let result = sqlx::query(&sql)
            .bind(dataset.as_str())
            .bind(owner_column(owner))
            .bind(key.as_str())
            .execute(&self.conn().await)
            .await?;

        tracing::trace!(%dataset, %key, %partition, "Deleted record");
        Ok(result.rows_affected() > 0)
    }

    async fn mark_read(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
        last_read: Timestamp,
    ) -> Result<bool, CacheError> {
        let sql = format!(
            "UPDATE {} SET last_read = ? WHERE data_type = ? AND owner_id = ? AND key = ?",
            table(partition)
        );
        let result = sqlx::query(&sql)
            .bind(last_read.as_millis())
            .bind(dataset.as_str())
            .bind(owner_column(owner))
            .bind(key.as_str())
            .execute(&self.conn().await)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn select(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, CacheError> {
        let (clause, binds) = where_clause(filter);
        let sql = format!("SELECT * FROM {}{} ORDER BY key", table(partition), clause);

        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&self.conn().await)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }

    async fn purge(&self, partition: Partition, filter: &RecordFilter) -> Result<u64, CacheError> {
        let (clause, binds) = where_clause(filter);
        let sql = format!("DELETE FROM {}{}", table(partition), clause);

        let result = bind_all(sqlx::query(&sql), &binds)
            .execute(&self.conn().await)
            .await?;

        tracing::debug!(
            %partition,
            removed = result.rows_affected(),
            "Purged records"
        );
        Ok(result.rows_affected())
    }

    async fn replace(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        records: &[Record],
    ) -> Result<(), CacheError> {
        let pool = self.conn().await;
        let mut tx = pool.begin().await?;

        let sql = format!(
            "DELETE FROM {} WHERE data_type = ? AND owner_id = ?",
            table(partition)
        );
        sqlx::query(&sql)
            .bind(dataset.as_str())
            .bind(owner_column(owner))
            .execute(&mut *tx)
            .await?;

        for record in records {
            insert_record(&mut *tx, partition, record).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            %dataset,
            %partition,
            count = records.len(),
            "Replaced partition slice"
        );
        Ok(())
    }
}

// ============================================================================
// ILocalStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalStore for SqliteRecordStore {
    async fn get(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
    ) -> Result<Option<Record>, StoreError> {
        Ok(self.fetch(partition, dataset, owner, key).await?)
    }

    async fn put(&self, partition: Partition, record: &Record) -> Result<(), StoreError> {
        insert_record(&self.conn().await, partition, record).await?;
        tracing::trace!(key = %record.key(), %partition, "Saved record");
        Ok(())
    }

    async fn delete(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
    ) -> Result<bool, StoreError> {
        Ok(self.remove(partition, dataset, owner, key).await?)
    }

    async fn touch(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        key: &RecordKey,
        last_read: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(self.mark_read(partition, dataset, owner, key, last_read).await?)
    }

    async fn query(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self.select(partition, filter).await?)
    }

    async fn delete_matching(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<u64, StoreError> {
        Ok(self.purge(partition, filter).await?)
    }

    async fn replace_all(
        &self,
        partition: Partition,
        dataset: &DatasetId,
        owner: Option<&OwnerId>,
        records: &[Record],
    ) -> Result<(), StoreError> {
        Ok(self.replace(partition, dataset, owner, records).await?)
    }

    async fn reinitialize(&self) -> Result<(), StoreError> {
        let mut guard = self.pool.write().await;
        let fresh = guard.reopen().await?;
        *guard = fresh;
        tracing::info!("Local store re-initialized");
        Ok(())
    }

    async fn recreate(&self) -> Result<(), StoreError> {
        self.pool.read().await.recreate().await?;
        tracing::warn!("Local store recreated, all partitions dropped");
        Ok(())
    }
}
