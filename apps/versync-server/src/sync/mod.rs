//! Versioned incremental sync engine
//!
//! Provides:
//! - Per-entity-type version allocation
//! - An append-only change log with paginated delta reads
//! - Optimistic-concurrency conflict checks
//! - Client cache integrity validation
//! - Per-entity history and operational stats
//!
//! # Sync Protocol
//!
//! 1. The write path reports a mutation; it is assigned the next version
//!    for its entity type and logged in the same transaction that moves
//!    the entity's version stamp
//! 2. Clients poll with the last version they applied (0 for a full
//!    resync) and apply the returned entries in order
//! 3. While `hasMore` is set the client advances its cursor to the last
//!    returned version and polls again
//! 4. Before submitting an edit a client may check its expected version;
//!    a mismatch means re-fetch, never merge
//!
//! Entries with `operation = delete` are tombstones: the client drops the
//! entity from its cache.

mod allocator;
mod changelog;
mod conflict;
mod history;
mod integrity;
mod service;
mod stamps;
mod stats;
mod types;
mod writer;

pub use allocator::VersionAllocator;
pub use changelog::ChangeLogStore;
pub use conflict::ConflictDetector;
pub use history::HistoryService;
pub use integrity::IntegrityValidator;
pub use service::SyncService;
pub use stamps::StampRepository;
pub use stats::StatsReporter;
pub use types::{
    ChangeLogEntry, ChangePage, ChangeRequest, ClientRecord, ConflictCheck, Discrepancy,
    DiscrepancyKind, EntityType, IncrementalUpdate, IntegrityReport, IntegrityRequest, Operation,
    OperationBreakdown, SyncStats, VersionInfo,
};
pub use writer::ChangeWriter;
