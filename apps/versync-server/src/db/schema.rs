//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- One counter row per registered entity type
CREATE TABLE IF NOT EXISTS sync_version_counters (
    entity_type TEXT PRIMARY KEY,
    current_version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- Append-only change log, one row per committed mutation
CREATE TABLE IF NOT EXISTS sync_change_log (
    entity_type TEXT NOT NULL,
    version INTEGER NOT NULL,
    entity_id INTEGER NOT NULL,
    operation TEXT NOT NULL CHECK (operation IN ('create', 'update', 'delete')),
    -- NULL for delete tombstones
    payload TEXT,
    created_at TEXT NOT NULL,

    PRIMARY KEY (entity_type, version)
);

CREATE INDEX IF NOT EXISTS idx_change_log_entity
    ON sync_change_log(entity_type, entity_id, version);

-- Version stamp carried by every live synchronized entity
CREATE TABLE IF NOT EXISTS sync_entity_stamps (
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (entity_type, entity_id)
);
"#;
