//! Append-only change log
//!
//! SQLite storage for change-log entries keyed by (entity type, version).
//! An append allocates the version, inserts the entry and moves the
//! entity's stamp in one transaction.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::config::{MAX_HISTORY, MAX_PAGE_SIZE};
use crate::error::{Result, SyncError};

use super::allocator::VersionAllocator;
use super::stamps::StampRepository;
use super::types::{ChangeLogEntry, ChangePage, EntityType, Operation, OperationBreakdown};

/// Repository for the change log
pub struct ChangeLogStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChangeLogStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a mutation and return the version assigned to it
    pub async fn append(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        operation: Operation,
        payload: Option<serde_json::Value>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let entry = self
            .append_in(&mut tx, entity_type, entity_id, operation, payload)
            .await?;
        tx.commit().await?;

        Ok(entry.version)
    }

    /// Record a mutation inside a caller-owned transaction
    ///
    /// Lets the write path commit its own entity columns together with
    /// the counter bump, the log entry and the stamp. A `create` needs a
    /// missing entity and `update`/`delete` need a live one.
    pub async fn append_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        entity_type: EntityType,
        entity_id: i64,
        operation: Operation,
        payload: Option<serde_json::Value>,
    ) -> Result<ChangeLogEntry> {
        let version = VersionAllocator::new(self.pool)
            .allocate_in(tx, entity_type)
            .await?;

        let current = StampRepository::new(self.pool)
            .stamp_in(tx, entity_type, entity_id)
            .await?;
        check_existence(entity_type, entity_id, operation, current)?;

        self.insert_entry_in(tx, entity_type, entity_id, version, operation, payload)
            .await
    }

    /// Insert the entry for an already allocated version and move the stamp
    ///
    /// Callers have already run [`check_existence`] against the stamp read
    /// in the same transaction.
    pub(crate) async fn insert_entry_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        entity_type: EntityType,
        entity_id: i64,
        version: u64,
        operation: Operation,
        payload: Option<serde_json::Value>,
    ) -> Result<ChangeLogEntry> {
        // Deletes are tombstones whatever the caller sent
        let payload = match operation {
            Operation::Delete => None,
            _ => payload,
        };
        let encoded = payload.as_ref().map(serde_json::to_string).transpose()?;
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sync_change_log (
                entity_type, version, entity_id, operation, payload, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entity_type.as_str())
        .bind(version as i64)
        .bind(entity_id)
        .bind(operation.as_str())
        .bind(&encoded)
        .bind(format_timestamp(&created_at))
        .execute(&mut **tx)
        .await?;

        StampRepository::new(self.pool)
            .write_in(tx, entity_type, entity_id, operation, version)
            .await?;

        tracing::info!(
            %entity_type,
            entity_id,
            version,
            operation = operation.as_str(),
            "Appended change"
        );

        Ok(ChangeLogEntry {
            entity_type,
            entity_id,
            version,
            operation,
            payload,
            created_at: parse_timestamp(&format_timestamp(&created_at))?,
        })
    }

    /// Entries with `version > after_version`, ascending, at most `limit`
    ///
    /// `limit` must be positive and is clamped to the page ceiling.
    pub async fn read_since(
        &self,
        entity_type: EntityType,
        after_version: u64,
        limit: i64,
    ) -> Result<ChangePage> {
        let limit = clamp_limit(limit, MAX_PAGE_SIZE)?;
        VersionAllocator::new(self.pool)
            .ensure_registered(entity_type)
            .await?;

        // One extra row tells us whether another page exists
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT entity_id, version, operation, payload, created_at
            FROM sync_change_log
            WHERE entity_type = ? AND version > ?
            ORDER BY version ASC
            LIMIT ?
            "#,
        )
        .bind(entity_type.as_str())
        .bind(after_version as i64)
        .bind(limit + 1)
        .fetch_all(self.pool)
        .await?;

        let has_more = (rows.len() as i64) > limit;
        let entries = rows
            .into_iter()
            .take(limit as usize)
            .map(|r| r.into_entry(entity_type))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            %entity_type,
            after_version,
            returned = entries.len(),
            has_more,
            "Read change page"
        );

        Ok(ChangePage { entries, has_more })
    }

    /// Entries for one entity, most recent first
    pub async fn history_of(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        limit: i64,
    ) -> Result<Vec<ChangeLogEntry>> {
        let limit = clamp_limit(limit, MAX_HISTORY)?;
        VersionAllocator::new(self.pool)
            .ensure_registered(entity_type)
            .await?;

        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT entity_id, version, operation, payload, created_at
            FROM sync_change_log
            WHERE entity_type = ? AND entity_id = ?
            ORDER BY version DESC
            LIMIT ?
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_entry(entity_type)).collect()
    }

    /// Entry counts grouped by operation
    pub async fn count_by_operation(&self, entity_type: EntityType) -> Result<OperationBreakdown> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT operation, COUNT(*)
            FROM sync_change_log
            WHERE entity_type = ?
            GROUP BY operation
            "#,
        )
        .bind(entity_type.as_str())
        .fetch_all(self.pool)
        .await?;

        let mut breakdown = OperationBreakdown::default();
        for (operation, count) in rows {
            breakdown.add(operation.parse()?, count as u64);
        }

        Ok(breakdown)
    }

    /// Timestamp of the newest entry
    pub async fn last_change_at(&self, entity_type: EntityType) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT created_at
            FROM sync_change_log
            WHERE entity_type = ?
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(entity_type.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(|(ts,)| parse_timestamp(&ts)).transpose()
    }
}

/// Existence rules for a change against the entity's current stamp
pub(crate) fn check_existence(
    entity_type: EntityType,
    entity_id: i64,
    operation: Operation,
    current: Option<u64>,
) -> Result<()> {
    match (operation, current) {
        (Operation::Create, Some(_)) => Err(SyncError::InvalidArgument(format!(
            "{} {} already exists",
            entity_type, entity_id
        ))),
        (Operation::Update | Operation::Delete, None) => {
            Err(SyncError::NotFound(format!("{} {}", entity_type, entity_id)))
        }
        _ => Ok(()),
    }
}

/// Validate a caller limit and cap it at `ceiling`
pub(crate) fn clamp_limit(limit: i64, ceiling: u32) -> Result<i64> {
    if limit <= 0 {
        return Err(SyncError::InvalidArgument(format!(
            "limit must be between 1 and {}, got {}",
            ceiling, limit
        )));
    }
    Ok(limit.min(ceiling as i64))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Storage(sqlx::Error::Decode(Box::new(e))))
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    entity_id: i64,
    version: i64,
    operation: String,
    payload: Option<String>,
    created_at: String,
}

impl EntryRow {
    fn into_entry(self, entity_type: EntityType) -> Result<ChangeLogEntry> {
        let operation = self.operation.parse().map_err(|_| {
            SyncError::Storage(sqlx::Error::Decode(
                format!("unknown operation in change log: {}", self.operation).into(),
            ))
        })?;

        let payload = self
            .payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(ChangeLogEntry {
            entity_type,
            entity_id: self.entity_id,
            version: self.version as u64,
            operation,
            payload,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use serde_json::json;

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        VersionAllocator::new(&pool)
            .register_all(&[EntityType::Customer, EntityType::Chat])
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_append_assigns_consecutive_versions() {
        let pool = setup_test_db().await;
        let store = ChangeLogStore::new(&pool);

        for (i, id) in [10, 11, 12].into_iter().enumerate() {
            let v = store
                .append(EntityType::Customer, id, Operation::Create, Some(json!({"n": i})))
                .await
                .unwrap();
            assert_eq!(v, i as u64 + 1);
        }

        let page = store.read_since(EntityType::Customer, 0, 10).await.unwrap();
        let versions: Vec<u64> = page.entries.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_append_moves_stamp() {
        let pool = setup_test_db().await;
        let store = ChangeLogStore::new(&pool);
        let stamps = StampRepository::new(&pool);

        store
            .append(EntityType::Customer, 5, Operation::Create, Some(json!({})))
            .await
            .unwrap();
        let v = store
            .append(EntityType::Customer, 5, Operation::Update, Some(json!({"name": "b"})))
            .await
            .unwrap();
        assert_eq!(stamps.stamp_of(EntityType::Customer, 5).await.unwrap(), Some(v));

        store
            .append(EntityType::Customer, 5, Operation::Delete, None)
            .await
            .unwrap();
        assert_eq!(stamps.stamp_of(EntityType::Customer, 5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_payload_is_dropped() {
        let pool = setup_test_db().await;
        let store = ChangeLogStore::new(&pool);

        store
            .append(EntityType::Chat, 1, Operation::Create, Some(json!({})))
            .await
            .unwrap();
        store
            .append(EntityType::Chat, 1, Operation::Delete, Some(json!({"stale": true})))
            .await
            .unwrap();

        let page = store.read_since(EntityType::Chat, 1, 10).await.unwrap();
        assert!(page.entries[0].is_tombstone());
        assert_eq!(page.entries[0].payload, None);
    }

    #[tokio::test]
    async fn test_read_since_pages() {
        let pool = setup_test_db().await;
        let store = ChangeLogStore::new(&pool);

        for id in 1..=5 {
            store
                .append(EntityType::Customer, id, Operation::Create, Some(json!({"id": id})))
                .await
                .unwrap();
        }

        let first = store.read_since(EntityType::Customer, 0, 2).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert!(first.has_more);

        let last = store.read_since(EntityType::Customer, 4, 2).await.unwrap();
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.entries[0].version, 5);
        assert!(!last.has_more);

        let exact = store.read_since(EntityType::Customer, 3, 2).await.unwrap();
        assert_eq!(exact.entries.len(), 2);
        assert!(!exact.has_more);
    }

    #[tokio::test]
    async fn test_read_since_rejects_bad_limit() {
        let pool = setup_test_db().await;
        let store = ChangeLogStore::new(&pool);

        for limit in [0, -3] {
            let err = store.read_since(EntityType::Customer, 0, limit).await.unwrap_err();
            assert!(matches!(err, SyncError::InvalidArgument(_)));
        }

        // Oversized limits are clamped, not rejected
        assert!(store.read_since(EntityType::Customer, 0, 50_000).await.is_ok());
    }

    #[tokio::test]
    async fn test_unregistered_type() {
        let pool = setup_test_db().await;
        let store = ChangeLogStore::new(&pool);

        let err = store
            .append(EntityType::User, 1, Operation::Create, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownEntityType(EntityType::User)));

        let err = store.read_since(EntityType::User, 0, 10).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownEntityType(EntityType::User)));
    }

    #[tokio::test]
    async fn test_history_is_most_recent_first() {
        let pool = setup_test_db().await;
        let store = ChangeLogStore::new(&pool);

        store.append(EntityType::Customer, 7, Operation::Create, Some(json!({}))).await.unwrap();
        store.append(EntityType::Customer, 8, Operation::Create, Some(json!({}))).await.unwrap();
        store.append(EntityType::Customer, 7, Operation::Update, Some(json!({}))).await.unwrap();
        store.append(EntityType::Customer, 7, Operation::Delete, None).await.unwrap();

        let history = store.history_of(EntityType::Customer, 7, 10).await.unwrap();
        let versions: Vec<u64> = history.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![4, 3, 1]);

        let capped = store.history_of(EntityType::Customer, 7, 2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].operation, Operation::Delete);
    }

    #[tokio::test]
    async fn test_count_by_operation() {
        let pool = setup_test_db().await;
        let store = ChangeLogStore::new(&pool);

        assert_eq!(
            store.count_by_operation(EntityType::Customer).await.unwrap(),
            OperationBreakdown::default()
        );
        assert!(store.last_change_at(EntityType::Customer).await.unwrap().is_none());

        store.append(EntityType::Customer, 1, Operation::Create, None).await.unwrap();
        store.append(EntityType::Customer, 1, Operation::Update, None).await.unwrap();
        store.append(EntityType::Customer, 2, Operation::Create, None).await.unwrap();

        let breakdown = store.count_by_operation(EntityType::Customer).await.unwrap();
        assert_eq!(breakdown, OperationBreakdown { create: 2, update: 1, delete: 0 });
        assert!(store.last_change_at(EntityType::Customer).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_append_in_rolls_back_as_a_unit() {
        let pool = setup_test_db().await;
        let store = ChangeLogStore::new(&pool);

        let mut tx = pool.begin().await.unwrap();
        store
            .append_in(&mut tx, EntityType::Customer, 1, Operation::Create, None)
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let page = store.read_since(EntityType::Customer, 0, 10).await.unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(
            VersionAllocator::new(&pool).current(EntityType::Customer).await.unwrap(),
            0
        );
        assert_eq!(
            StampRepository::new(&pool).stamp_of(EntityType::Customer, 1).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_append_enforces_existence() {
        let pool = setup_test_db().await;
        let store = ChangeLogStore::new(&pool);
        let stamps = StampRepository::new(&pool);

        let err = store
            .append(EntityType::Customer, 3, Operation::Update, Some(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
        assert_eq!(stamps.stamp_of(EntityType::Customer, 3).await.unwrap(), None);

        let err = store
            .append(EntityType::Customer, 3, Operation::Delete, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));

        store
            .append(EntityType::Customer, 3, Operation::Create, Some(json!({})))
            .await
            .unwrap();
        let err = store
            .append(EntityType::Customer, 3, Operation::Create, Some(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));

        // Rejected appends roll their allocation back
        assert_eq!(
            VersionAllocator::new(&pool).current(EntityType::Customer).await.unwrap(),
            1
        );
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(5, 100).unwrap(), 5);
        assert_eq!(clamp_limit(500, 100).unwrap(), 100);
        assert!(clamp_limit(0, 100).is_err());
    }
}
