//! Sync API endpoints
//!
//! Thin handlers over the sync engine; validation and error mapping live
//! in the services and in `SyncError`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use crate::sync::{
    ChangeLogEntry, ChangeRequest, ChangeWriter, ConflictCheck, ConflictDetector, EntityType,
    HistoryService, IncrementalUpdate, IntegrityReport, IntegrityRequest, IntegrityValidator,
    StatsReporter, SyncService, SyncStats, VersionAllocator, VersionInfo,
};

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/versions", get(list_versions))
        .route("/:entity_type/changes", get(get_changes).post(record_change))
        .route("/:entity_type/validate", post(validate_integrity))
        .route("/:entity_type/stats", get(get_stats))
        .route("/:entity_type/version", get(get_current_version))
        .route("/:entity_type/:entity_id/history", get(get_history))
        .route("/:entity_type/:entity_id/conflict", get(check_conflict))
}

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    #[serde(default)]
    pub since: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ConflictQuery {
    #[serde(rename = "expectedVersion")]
    pub expected_version: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub entries: Vec<ChangeLogEntry>,
}

/// Pull changes since a client cursor
async fn get_changes(
    State(state): State<AppState>,
    ApiPath(entity_type): ApiPath<String>,
    ApiQuery(query): ApiQuery<ChangesQuery>,
) -> Result<Json<IncrementalUpdate>> {
    let entity_type = state.entity_type(&entity_type)?;
    let update = SyncService::new(state.db(), state.limits())
        .get_incremental_update(entity_type, query.since, query.limit)
        .await?;
    Ok(Json(update))
}

/// Record a mutation from the write path
async fn record_change(
    State(state): State<AppState>,
    ApiPath(entity_type): ApiPath<String>,
    ApiJson(change): ApiJson<ChangeRequest>,
) -> Result<(StatusCode, Json<ChangeLogEntry>)> {
    let entity_type = state.entity_type(&entity_type)?;
    let entry = ChangeWriter::new(state.db())
        .record(entity_type, change)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Audit a batch of client-held versions
async fn validate_integrity(
    State(state): State<AppState>,
    ApiPath(entity_type): ApiPath<String>,
    ApiJson(req): ApiJson<IntegrityRequest>,
) -> Result<Json<IntegrityReport>> {
    let entity_type = state.entity_type(&entity_type)?;
    let report = IntegrityValidator::new(state.db(), state.limits())
        .report(entity_type, &req.records)
        .await?;
    Ok(Json(report))
}

async fn get_stats(
    State(state): State<AppState>,
    ApiPath(entity_type): ApiPath<String>,
) -> Result<Json<SyncStats>> {
    let entity_type = state.entity_type(&entity_type)?;
    let stats = StatsReporter::new(state.db()).get_stats(entity_type).await?;
    Ok(Json(stats))
}

async fn get_current_version(
    State(state): State<AppState>,
    ApiPath(entity_type): ApiPath<String>,
) -> Result<Json<VersionInfo>> {
    let entity_type = state.entity_type(&entity_type)?;
    let current_version = VersionAllocator::new(state.db()).current(entity_type).await?;
    Ok(Json(VersionInfo {
        entity_type,
        current_version,
    }))
}

async fn list_versions(State(state): State<AppState>) -> Result<Json<Vec<VersionInfo>>> {
    let versions: Vec<VersionInfo> = VersionAllocator::new(state.db())
        .all_current()
        .await?
        .into_iter()
        .filter(|v| state.is_enabled(v.entity_type))
        .collect();
    Ok(Json(versions))
}

async fn get_history(
    State(state): State<AppState>,
    ApiPath((entity_type, entity_id)): ApiPath<(String, i64)>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let entity_type = state.entity_type(&entity_type)?;
    let entries = HistoryService::new(state.db(), state.limits())
        .get_version_history(entity_type, entity_id, query.limit)
        .await?;
    Ok(Json(HistoryResponse {
        entity_type,
        entity_id,
        entries,
    }))
}

async fn check_conflict(
    State(state): State<AppState>,
    ApiPath((entity_type, entity_id)): ApiPath<(String, i64)>,
    ApiQuery(query): ApiQuery<ConflictQuery>,
) -> Result<Json<ConflictCheck>> {
    let entity_type = state.entity_type(&entity_type)?;
    let check = ConflictDetector::new(state.db())
        .check_conflict(entity_type, entity_id, query.expected_version)
        .await?;
    Ok(Json(check))
}
