//! Per-entity-type version counters
//!
//! Each registered entity type owns one row in `sync_version_counters`.
//! Allocation is a single `UPDATE ... RETURNING` executed inside the
//! caller's transaction, so SQLite's writer lock serializes concurrent
//! allocations and a rolled-back transaction never exposes its version.

use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::error::{Result, SyncError};

use super::types::{EntityType, VersionInfo};

/// Issues monotonically increasing versions per entity type
pub struct VersionAllocator<'a> {
    pool: &'a SqlitePool,
}

impl<'a> VersionAllocator<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the counter row for an entity type if it does not exist yet
    ///
    /// Registering an already known type leaves its counter untouched.
    pub async fn register(&self, entity_type: EntityType) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO sync_version_counters (entity_type, current_version, created_at, updated_at)
            VALUES (?, 0, ?, ?)
            ON CONFLICT(entity_type) DO NOTHING
            "#,
        )
        .bind(entity_type.as_str())
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(%entity_type, "Registered entity type");
        }

        Ok(())
    }

    /// Register every type in `entity_types`
    pub async fn register_all(&self, entity_types: &[EntityType]) -> Result<()> {
        for entity_type in entity_types {
            self.register(*entity_type).await?;
        }
        Ok(())
    }

    /// Allocate the next version for `entity_type` inside `tx`
    ///
    /// The increment commits or rolls back together with the rest of
    /// the transaction.
    pub async fn allocate_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        entity_type: EntityType,
    ) -> Result<u64> {
        allocate(tx, entity_type).await
    }

    /// Read-only snapshot of the counter
    pub async fn current(&self, entity_type: EntityType) -> Result<u64> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT current_version FROM sync_version_counters WHERE entity_type = ?",
        )
        .bind(entity_type.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(|(v,)| v as u64)
            .ok_or(SyncError::UnknownEntityType(entity_type))
    }

    /// Fail with `UnknownEntityType` unless the type has been registered
    pub async fn ensure_registered(&self, entity_type: EntityType) -> Result<()> {
        self.current(entity_type).await.map(|_| ())
    }

    /// Counters for every registered entity type
    pub async fn all_current(&self) -> Result<Vec<VersionInfo>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT entity_type, current_version FROM sync_version_counters ORDER BY entity_type",
        )
        .fetch_all(self.pool)
        .await?;

        let mut versions = Vec::with_capacity(rows.len());
        for (name, version) in rows {
            match name.parse::<EntityType>() {
                Ok(entity_type) => versions.push(VersionInfo {
                    entity_type,
                    current_version: version as u64,
                }),
                Err(_) => tracing::warn!(entity_type = %name, "Skipping unrecognized counter row"),
            }
        }

        Ok(versions)
    }
}

async fn allocate(conn: &mut SqliteConnection, entity_type: EntityType) -> Result<u64> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE sync_version_counters
        SET current_version = current_version + 1,
            updated_at = ?
        WHERE entity_type = ?
        RETURNING current_version
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(entity_type.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    let (version,) = row.ok_or(SyncError::UnknownEntityType(entity_type))?;
    tracing::debug!(%entity_type, version, "Allocated version");

    Ok(version as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        VersionAllocator::new(&pool)
            .register(EntityType::Customer)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_counter_starts_at_zero() {
        let pool = setup_test_db().await;
        let allocator = VersionAllocator::new(&pool);

        assert_eq!(allocator.current(EntityType::Customer).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_type_is_unknown() {
        let pool = setup_test_db().await;
        let allocator = VersionAllocator::new(&pool);

        let err = allocator.current(EntityType::Lead).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownEntityType(EntityType::Lead)));

        let mut tx = pool.begin().await.unwrap();
        let err = allocator.allocate_in(&mut tx, EntityType::Lead).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownEntityType(EntityType::Lead)));
    }

    #[tokio::test]
    async fn test_allocation_is_strictly_increasing() {
        let pool = setup_test_db().await;
        let allocator = VersionAllocator::new(&pool);

        let mut tx = pool.begin().await.unwrap();
        let v1 = allocator.allocate_in(&mut tx, EntityType::Customer).await.unwrap();
        let v2 = allocator.allocate_in(&mut tx, EntityType::Customer).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!((v1, v2), (1, 2));
        assert_eq!(allocator.current(EntityType::Customer).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rolled_back_allocation_is_not_visible() {
        let pool = setup_test_db().await;
        let allocator = VersionAllocator::new(&pool);

        let mut tx = pool.begin().await.unwrap();
        allocator.allocate_in(&mut tx, EntityType::Customer).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(allocator.current(EntityType::Customer).await.unwrap(), 0);

        let mut tx = pool.begin().await.unwrap();
        let v = allocator.allocate_in(&mut tx, EntityType::Customer).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(v, 1);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let pool = setup_test_db().await;
        let allocator = VersionAllocator::new(&pool);

        let mut tx = pool.begin().await.unwrap();
        allocator.allocate_in(&mut tx, EntityType::Customer).await.unwrap();
        tx.commit().await.unwrap();

        allocator
            .register_all(&[EntityType::Customer, EntityType::Chat])
            .await
            .unwrap();

        let all = allocator.all_current().await.unwrap();
        assert_eq!(
            all,
            vec![
                VersionInfo { entity_type: EntityType::Chat, current_version: 0 },
                VersionInfo { entity_type: EntityType::Customer, current_version: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_counters_are_independent_per_type() {
        let pool = setup_test_db().await;
        let allocator = VersionAllocator::new(&pool);
        allocator.register(EntityType::User).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        allocator.allocate_in(&mut tx, EntityType::Customer).await.unwrap();
        allocator.allocate_in(&mut tx, EntityType::Customer).await.unwrap();
        let user_v = allocator.allocate_in(&mut tx, EntityType::User).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(user_v, 1);
    }
}
