//! Per-entity audit trail

use sqlx::SqlitePool;

use crate::config::SyncLimits;
use crate::error::{Result, SyncError};

use super::changelog::{clamp_limit, ChangeLogStore};
use super::types::{ChangeLogEntry, EntityType};

pub struct HistoryService<'a> {
    pool: &'a SqlitePool,
    limits: SyncLimits,
}

impl<'a> HistoryService<'a> {
    pub fn new(pool: &'a SqlitePool, limits: SyncLimits) -> Self {
        Self { pool, limits }
    }

    /// Change-log entries for one entity, most recent first
    ///
    /// An entity that never appeared in the log is `NotFound`; a deleted
    /// one still has its history.
    pub async fn get_version_history(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<ChangeLogEntry>> {
        let limit = match limit {
            Some(l) => clamp_limit(l, self.limits.max_history)?,
            None => self.limits.max_history as i64,
        };

        let history = ChangeLogStore::new(self.pool)
            .history_of(entity_type, entity_id, limit)
            .await?;

        if history.is_empty() {
            return Err(SyncError::NotFound(format!(
                "no history for {} {}",
                entity_type, entity_id
            )));
        }

        Ok(history)
    }
}
