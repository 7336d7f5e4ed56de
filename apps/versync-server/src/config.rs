//! Configuration management for Versync Server

use std::env;

use serde::Deserialize;
use thiserror::Error;

use crate::sync::EntityType;

/// Hard ceiling for a delta page
pub const MAX_PAGE_SIZE: u32 = 1000;
/// Hard ceiling for a history listing
pub const MAX_HISTORY: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Entity types served by this deployment; registered at startup
    pub entity_types: Vec<EntityType>,
    pub limits: SyncLimits,
}

/// Request size bounds applied by the sync services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SyncLimits {
    pub max_page_size: u32,
    pub default_page_size: u32,
    pub max_history: u32,
    pub max_validate_batch: usize,
}

impl Default for SyncLimits {
    fn default() -> Self {
        SyncLimits {
            max_page_size: MAX_PAGE_SIZE,
            default_page_size: 100,
            max_history: MAX_HISTORY,
            max_validate_batch: 1000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./versync.db".to_string(),
                max_connections: 5,
            },
            sync: SyncConfig {
                entity_types: EntityType::ALL.to_vec(),
                limits: SyncLimits::default(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = SyncLimits::default();

        let entity_types = match env::var("SYNC_ENTITY_TYPES") {
            Ok(raw) => parse_entity_types(&raw)?,
            Err(_) => EntityType::ALL.to_vec(),
        };

        let max_page_size = parse_var("SYNC_MAX_PAGE_SIZE", defaults.max_page_size)?
            .clamp(1, MAX_PAGE_SIZE);
        let max_history =
            parse_var("SYNC_MAX_HISTORY", defaults.max_history)?.clamp(1, MAX_HISTORY);

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./versync.db".to_string()),
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            sync: SyncConfig {
                entity_types,
                limits: SyncLimits {
                    max_page_size,
                    default_page_size: parse_var(
                        "SYNC_DEFAULT_PAGE_SIZE",
                        defaults.default_page_size,
                    )?
                    .clamp(1, max_page_size),
                    max_history,
                    max_validate_batch: parse_var(
                        "SYNC_MAX_VALIDATE_BATCH",
                        defaults.max_validate_batch,
                    )?
                    .max(1),
                },
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}

fn parse_entity_types(raw: &str) -> Result<Vec<EntityType>, ConfigError> {
    let mut types = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let entity_type = name.parse().map_err(|_| ConfigError::InvalidValue {
            key: "SYNC_ENTITY_TYPES",
            value: name.to_string(),
        })?;
        if !types.contains(&entity_type) {
            types.push(entity_type);
        }
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_types() {
        let types = parse_entity_types("customer, chat_message,customer,").unwrap();
        assert_eq!(types, vec![EntityType::Customer, EntityType::ChatMessage]);
    }

    #[test]
    fn test_parse_entity_types_rejects_unknown() {
        let err = parse_entity_types("customer,invoice").unwrap_err();
        assert!(err.to_string().contains("invoice"));
    }

    #[test]
    fn test_default_limits() {
        let limits = Config::default().sync.limits;
        assert_eq!(limits.max_page_size, 1000);
        assert_eq!(limits.max_history, 100);
        assert!(limits.default_page_size <= limits.max_page_size);
    }
}
