//! Incremental delta retrieval
//!
//! Clients poll with the last version they applied and receive the next
//! page of changes in strictly ascending version order, together with the
//! authoritative frontier for that entity type.

use sqlx::SqlitePool;

use crate::config::SyncLimits;
use crate::error::{Result, SyncError};

use super::allocator::VersionAllocator;
use super::changelog::{clamp_limit, ChangeLogStore};
use super::types::{EntityType, IncrementalUpdate};

/// Serves paginated deltas since a client cursor
pub struct SyncService<'a> {
    pool: &'a SqlitePool,
    limits: SyncLimits,
}

impl<'a> SyncService<'a> {
    pub fn new(pool: &'a SqlitePool, limits: SyncLimits) -> Self {
        Self { pool, limits }
    }

    /// Changes after `client_version`, at most `limit` of them
    ///
    /// A cursor of 0 requests a full resync. `limit` defaults to the
    /// configured page size and is capped at the configured maximum.
    /// The frontier is read after the page, so it is never below the last
    /// returned version; `has_more` is a point-in-time signal only.
    pub async fn get_incremental_update(
        &self,
        entity_type: EntityType,
        client_version: i64,
        limit: Option<i64>,
    ) -> Result<IncrementalUpdate> {
        if client_version < 0 {
            return Err(SyncError::InvalidArgument(format!(
                "clientVersion must be >= 0, got {}",
                client_version
            )));
        }

        let limit = match limit {
            Some(l) => clamp_limit(l, self.limits.max_page_size)?,
            None => self.limits.default_page_size as i64,
        };

        let page = ChangeLogStore::new(self.pool)
            .read_since(entity_type, client_version as u64, limit)
            .await?;

        let current_version = VersionAllocator::new(self.pool).current(entity_type).await?;

        tracing::debug!(
            %entity_type,
            client_version,
            returned = page.entries.len(),
            current_version,
            has_more = page.has_more,
            "Served incremental update"
        );

        Ok(IncrementalUpdate {
            entity_type,
            entries: page.entries,
            current_version,
            has_more: page.has_more,
        })
    }
}
