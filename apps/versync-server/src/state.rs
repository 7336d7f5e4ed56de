//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::{Config, SyncLimits};
use crate::error::{Result, SyncError};
use crate::sync::EntityType;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
}

impl AppState {
    pub fn new(config: Config, db: SqlitePool) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, db }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Request bounds for the sync services
    pub fn limits(&self) -> SyncLimits {
        self.inner.config.sync.limits
    }

    /// Whether `entity_type` is enabled by `SYNC_ENTITY_TYPES`
    pub fn is_enabled(&self, entity_type: EntityType) -> bool {
        self.inner.config.sync.entity_types.contains(&entity_type)
    }

    /// Parse a path segment into an entity type enabled in this deployment
    ///
    /// A counter row left behind by an earlier, wider configuration does
    /// not re-enable a type.
    pub fn entity_type(&self, raw: &str) -> Result<EntityType> {
        let entity_type: EntityType = raw.parse()?;
        if !self.is_enabled(entity_type) {
            return Err(SyncError::UnknownEntityType(entity_type));
        }
        Ok(entity_type)
    }
}
