//! Write-path trigger
//!
//! Entry point for collaborators reporting "entity X of type T was
//! created/updated/deleted". Enforces the optimistic-concurrency check
//! inside the write transaction: a mismatched expected version rejects
//! the write instead of overwriting.

use sqlx::SqlitePool;

use crate::error::{Result, SyncError};

use super::allocator::VersionAllocator;
use super::changelog::{check_existence, ChangeLogStore};
use super::stamps::StampRepository;
use super::types::{ChangeLogEntry, ChangeRequest, EntityType};

pub struct ChangeWriter<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChangeWriter<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record one change atomically
    ///
    /// The counter bump comes first so the transaction takes SQLite's
    /// write lock before reading the stamp; every rejection below rolls
    /// the bump back with the rest.
    pub async fn record(
        &self,
        entity_type: EntityType,
        change: ChangeRequest,
    ) -> Result<ChangeLogEntry> {
        let mut tx = self.pool.begin().await?;

        let version = VersionAllocator::new(self.pool)
            .allocate_in(&mut tx, entity_type)
            .await?;

        let current = StampRepository::new(self.pool)
            .stamp_in(&mut tx, entity_type, change.entity_id)
            .await?;

        check_existence(entity_type, change.entity_id, change.operation, current)?;

        if let (Some(expected), Some(current_version)) = (change.expected_version, current) {
            if expected != current_version {
                tracing::warn!(
                    %entity_type,
                    entity_id = change.entity_id,
                    expected,
                    current_version,
                    "Rejected write with stale version"
                );
                return Err(SyncError::Conflict {
                    entity_type,
                    entity_id: change.entity_id,
                    expected_version: expected,
                    current_version,
                });
            }
        }

        let entry = ChangeLogStore::new(self.pool)
            .insert_entry_in(
                &mut tx,
                entity_type,
                change.entity_id,
                version,
                change.operation,
                change.payload,
            )
            .await?;

        tx.commit().await?;

        Ok(entry)
    }
}
