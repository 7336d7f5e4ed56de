//! Error types for the Versync server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::sync::EntityType;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, SyncError>;

/// Sync engine error type
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(EntityType),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(
        "Version conflict on {entity_type} {entity_id}: expected {expected_version}, current {current_version}"
    )]
    Conflict {
        entity_type: EntityType,
        entity_id: i64,
        expected_version: u64,
        current_version: u64,
    },

    #[error("Storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Authoritative version carried by a conflict
    pub fn current_version(&self) -> Option<u64> {
        match self {
            SyncError::Conflict { current_version, .. } => Some(*current_version),
            _ => None,
        }
    }
}

/// Error response body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            SyncError::InvalidArgument(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_argument", msg.clone())
            }
            SyncError::UnknownEntityType(t) => (
                StatusCode::BAD_REQUEST,
                "unknown_entity_type",
                format!("Entity type not registered: {}", t),
            ),
            SyncError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            SyncError::Conflict { .. } => {
                tracing::debug!("Rejected write: {}", self);
                (StatusCode::CONFLICT, "conflict", self.to_string())
            }
            SyncError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Storage error".to_string(),
                )
            }
            SyncError::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let internal = status == StatusCode::INTERNAL_SERVER_ERROR;
        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            current_version: self.current_version(),
            details: if cfg!(debug_assertions) && internal {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
