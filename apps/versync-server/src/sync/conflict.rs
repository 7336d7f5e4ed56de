//! Optimistic-concurrency conflict detection
//!
//! Conflicts are reported, never resolved: a client whose expected version
//! differs from the entity's stamp must re-fetch and retry.

use sqlx::SqlitePool;

use crate::error::{Result, SyncError};

use super::allocator::VersionAllocator;
use super::stamps::StampRepository;
use super::types::{ConflictCheck, EntityType};

/// Compares a client's expected version against the entity stamp
pub struct ConflictDetector<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Advisory check; does not lock or serialize a later write
    ///
    /// Any inequality is a conflict, including an expected version above
    /// the stamp. A missing entity is `NotFound`, not a conflict.
    pub async fn check_conflict(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        expected_version: i64,
    ) -> Result<ConflictCheck> {
        if expected_version < 0 {
            return Err(SyncError::InvalidArgument(format!(
                "expectedVersion must be >= 0, got {}",
                expected_version
            )));
        }

        VersionAllocator::new(self.pool)
            .ensure_registered(entity_type)
            .await?;

        let current_version = StampRepository::new(self.pool)
            .stamp_of(entity_type, entity_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("{} {}", entity_type, entity_id)))?;

        let check = ConflictCheck {
            has_conflict: current_version != expected_version as u64,
            current_version,
        };

        if check.has_conflict {
            tracing::debug!(
                %entity_type,
                entity_id,
                expected_version,
                current_version,
                "Version conflict detected"
            );
        }

        Ok(check)
    }
}
