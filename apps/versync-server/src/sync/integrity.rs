//! Client cache integrity validation
//!
//! Audits a batch of client-held (id, version) pairs against the current
//! stamps. Useful after long offline periods, independent of the delta flow.

use std::cmp::Ordering;

use sqlx::SqlitePool;

use crate::config::SyncLimits;
use crate::error::{Result, SyncError};

use super::allocator::VersionAllocator;
use super::stamps::StampRepository;
use super::types::{ClientRecord, Discrepancy, DiscrepancyKind, EntityType, IntegrityReport};

pub struct IntegrityValidator<'a> {
    pool: &'a SqlitePool,
    limits: SyncLimits,
}

impl<'a> IntegrityValidator<'a> {
    pub fn new(pool: &'a SqlitePool, limits: SyncLimits) -> Self {
        Self { pool, limits }
    }

    /// One discrepancy per client record that disagrees with the server
    ///
    /// An empty result means every record matched exactly.
    pub async fn validate(
        &self,
        entity_type: EntityType,
        records: &[ClientRecord],
    ) -> Result<Vec<Discrepancy>> {
        if records.len() > self.limits.max_validate_batch {
            return Err(SyncError::InvalidArgument(format!(
                "at most {} records per validation, got {}",
                self.limits.max_validate_batch,
                records.len()
            )));
        }

        VersionAllocator::new(self.pool)
            .ensure_registered(entity_type)
            .await?;

        if records.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let stamps = StampRepository::new(self.pool)
            .stamps_for(entity_type, &ids)
            .await?;

        let discrepancies: Vec<Discrepancy> = records
            .iter()
            .filter_map(|record| compare(record, stamps.get(&record.id).copied()))
            .collect();

        tracing::debug!(
            %entity_type,
            checked = records.len(),
            discrepancies = discrepancies.len(),
            "Validated client records"
        );

        Ok(discrepancies)
    }

    /// [`validate`](Self::validate) wrapped in a report
    pub async fn report(
        &self,
        entity_type: EntityType,
        records: &[ClientRecord],
    ) -> Result<IntegrityReport> {
        let discrepancies = self.validate(entity_type, records).await?;

        Ok(IntegrityReport {
            entity_type,
            is_valid: discrepancies.is_empty(),
            checked: records.len(),
            discrepancies,
        })
    }
}

fn compare(record: &ClientRecord, server_version: Option<u64>) -> Option<Discrepancy> {
    let kind = match server_version {
        None => DiscrepancyKind::Deleted,
        Some(server) => match server.cmp(&record.version) {
            Ordering::Equal => return None,
            Ordering::Greater => DiscrepancyKind::Stale,
            Ordering::Less => DiscrepancyKind::Invalid,
        },
    };

    Some(Discrepancy {
        id: record.id,
        kind,
        client_version: record.version,
        server_version,
    })
}
