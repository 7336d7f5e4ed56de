//! Entity version stamps
//!
//! The `version` carried by each live synchronized entity. A stamp always
//! equals the version of the entity's latest non-delete change, and a
//! deleted entity has no stamp at all.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::error::Result;

use super::types::{EntityType, Operation};

/// Placeholder budget per `IN (...)` query
const LOOKUP_CHUNK: usize = 500;

/// Repository for entity version stamps
pub struct StampRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StampRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Current stamp for one entity, `None` if it does not exist
    pub async fn stamp_of(&self, entity_type: EntityType, entity_id: i64) -> Result<Option<u64>> {
        let mut conn = self.pool.acquire().await?;
        read_stamp(&mut conn, entity_type, entity_id).await
    }

    /// Same as [`stamp_of`](Self::stamp_of), read inside a transaction
    pub async fn stamp_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        entity_type: EntityType,
        entity_id: i64,
    ) -> Result<Option<u64>> {
        read_stamp(tx, entity_type, entity_id).await
    }

    /// Stamps for a batch of ids; missing entities are absent from the map
    pub async fn stamps_for(
        &self,
        entity_type: EntityType,
        ids: &[i64],
    ) -> Result<HashMap<i64, u64>> {
        let mut unique: Vec<i64> = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let mut stamps = HashMap::with_capacity(unique.len());

        for chunk in unique.chunks(LOOKUP_CHUNK) {
            let placeholders: Vec<&str> = chunk.iter().map(|_| "?").collect();
            let query = format!(
                "SELECT entity_id, version FROM sync_entity_stamps WHERE entity_type = ? AND entity_id IN ({})",
                placeholders.join(", ")
            );

            let mut q = sqlx::query_as::<_, (i64, i64)>(&query).bind(entity_type.as_str());
            for id in chunk {
                q = q.bind(id);
            }

            for (id, version) in q.fetch_all(self.pool).await? {
                stamps.insert(id, version as u64);
            }
        }

        Ok(stamps)
    }

    /// Number of live stamps for an entity type
    pub async fn count(&self, entity_type: EntityType) -> Result<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sync_entity_stamps WHERE entity_type = ?")
                .bind(entity_type.as_str())
                .fetch_one(self.pool)
                .await?;

        Ok(count as u64)
    }

    /// Apply a change to the stamp inside the change's transaction
    pub async fn write_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        entity_type: EntityType,
        entity_id: i64,
        operation: Operation,
        version: u64,
    ) -> Result<()> {
        write_stamp(tx, entity_type, entity_id, operation, version).await
    }
}

async fn read_stamp(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: i64,
) -> Result<Option<u64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT version FROM sync_entity_stamps WHERE entity_type = ? AND entity_id = ?",
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(v,)| v as u64))
}

async fn write_stamp(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: i64,
    operation: Operation,
    version: u64,
) -> Result<()> {
    match operation {
        Operation::Delete => {
            sqlx::query("DELETE FROM sync_entity_stamps WHERE entity_type = ? AND entity_id = ?")
                .bind(entity_type.as_str())
                .bind(entity_id)
                .execute(&mut *conn)
                .await?;
        }
        Operation::Create | Operation::Update => {
            sqlx::query(
                r#"
                INSERT INTO sync_entity_stamps (entity_type, entity_id, version, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(entity_type, entity_id) DO UPDATE SET
                    version = excluded.version,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(entity_type.as_str())
            .bind(entity_id)
            .bind(version as i64)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}
