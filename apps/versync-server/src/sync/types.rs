//! Sync data types
//!
//! Defines the wire and storage types for incremental sync:
//! - Entity types and change operations
//! - Change-log entries and delta pages
//! - Conflict checks, integrity discrepancies and stats

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Types of entities that can be synced
///
/// The set is closed: adding a new synchronized entity means adding a
/// variant here and registering it with the allocator at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Customer,
    Lead,
    Case,
    Chat,
    ChatMessage,
    User,
}

impl EntityType {
    /// Every entity type, in declaration order
    pub const ALL: [EntityType; 6] = [
        EntityType::Customer,
        EntityType::Lead,
        EntityType::Case,
        EntityType::Chat,
        EntityType::ChatMessage,
        EntityType::User,
    ];

    /// Storage and wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Customer => "customer",
            EntityType::Lead => "lead",
            EntityType::Case => "case",
            EntityType::Chat => "chat",
            EntityType::ChatMessage => "chat_message",
            EntityType::User => "user",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SyncError::InvalidArgument(format!("unknown entity type: {}", s)))
    }
}

/// Types of change operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl FromStr for Operation {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(SyncError::InvalidArgument(format!("unknown operation: {}", other))),
        }
    }
}

/// One immutable record of a mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub entity_type: EntityType,
    pub entity_id: i64,
    /// Version allocated to this change, unique per entity type
    pub version: u64,
    pub operation: Operation,
    /// Snapshot of the entity at change time; `None` for deletes
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ChangeLogEntry {
    /// A delete entry means "drop this id from the local cache"
    pub fn is_tombstone(&self) -> bool {
        self.operation == Operation::Delete
    }
}

/// One page of changes read from the log
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePage {
    pub entries: Vec<ChangeLogEntry>,
    /// More entries existed beyond this page at read time
    pub has_more: bool,
}

/// Response to an incremental update request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalUpdate {
    pub entity_type: EntityType,
    pub entries: Vec<ChangeLogEntry>,
    /// Authoritative frontier at read time
    pub current_version: u64,
    pub has_more: bool,
}

impl IncrementalUpdate {
    /// Cursor the client should send on its next poll
    pub fn next_cursor(&self, client_version: u64) -> u64 {
        self.entries.last().map(|e| e.version).unwrap_or(client_version)
    }
}

/// A change reported by the write path
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    pub operation: Operation,
    pub entity_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Stamp the caller last saw; a mismatch rejects the write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

/// Result of an optimistic-concurrency check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCheck {
    pub has_conflict: bool,
    pub current_version: u64,
}

/// A client-held (id, version) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: i64,
    pub version: u64,
}

/// Why a client record disagrees with the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscrepancyKind {
    /// Entity no longer exists
    Deleted,
    /// Server holds a newer version
    Stale,
    /// Client claims a version the server never reached
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub id: i64,
    pub kind: DiscrepancyKind,
    pub client_version: u64,
    pub server_version: Option<u64>,
}

/// Request body for integrity validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityRequest {
    pub records: Vec<ClientRecord>,
}

/// Integrity validation outcome for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub entity_type: EntityType,
    pub is_valid: bool,
    pub checked: usize,
    pub discrepancies: Vec<Discrepancy>,
}

/// Change counts per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationBreakdown {
    pub create: u64,
    pub update: u64,
    pub delete: u64,
}

impl OperationBreakdown {
    pub fn total(&self) -> u64 {
        self.create + self.update + self.delete
    }

    pub(crate) fn add(&mut self, operation: Operation, count: u64) {
        match operation {
            Operation::Create => self.create += count,
            Operation::Update => self.update += count,
            Operation::Delete => self.delete += count,
        }
    }
}

/// Operational stats for one entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub entity_type: EntityType,
    pub current_version: u64,
    pub total_change_count: u64,
    pub operation_breakdown: OperationBreakdown,
    /// Entities currently carrying a stamp
    pub tracked_entities: u64,
    pub last_change_at: Option<DateTime<Utc>>,
}

/// Current counter value for one entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub entity_type: EntityType,
    pub current_version: u64,
}
