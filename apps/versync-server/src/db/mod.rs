//! Database module for SQLite persistence
//!
//! Holds the version counters, the change log and the entity version stamps.

mod schema;

pub use schema::*;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;

use crate::error::Result;

/// Create a new database connection pool
///
/// An in-memory database lives only as long as its connection, so
/// `sqlite::memory:` gets a single connection that is never recycled.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    create_pool_with(database_url, 5).await
}

/// Create a pool with an explicit connection cap
pub async fn create_pool_with(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    let mut options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?
    };

    // Run migrations
    initialize_schema(&pool).await?;

    Ok(pool)
}
