//! Operational counters per entity type

use sqlx::SqlitePool;

use crate::error::Result;

use super::allocator::VersionAllocator;
use super::changelog::ChangeLogStore;
use super::stamps::StampRepository;
use super::types::{EntityType, SyncStats};

pub struct StatsReporter<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StatsReporter<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Advisory snapshot; the parts are read independently
    pub async fn get_stats(&self, entity_type: EntityType) -> Result<SyncStats> {
        let current_version = VersionAllocator::new(self.pool).current(entity_type).await?;

        let store = ChangeLogStore::new(self.pool);
        let stamps = StampRepository::new(self.pool);
        let (operation_breakdown, last_change_at, tracked_entities) = futures::try_join!(
            store.count_by_operation(entity_type),
            store.last_change_at(entity_type),
            stamps.count(entity_type),
        )?;

        Ok(SyncStats {
            entity_type,
            current_version,
            total_change_count: operation_breakdown.total(),
            operation_breakdown,
            tracked_entities,
            last_change_at,
        })
    }
}
