/// Storage module
///
/// Two durable stores with different jobs:
/// - `PersistenceGateway`: the primary relational store (records,
///   vendors, product and location lists)
/// - `ProgressStore`: cursor and recovery snapshot, kept on a separate
///   server so staging still works while the primary is down
///
/// Both report failures as `StoreError`, split into connectivity and
/// integrity; the run controller decides what to stage on that split.
use std::collections::HashSet;

use chrono::NaiveDateTime;

use crate::{
    error::StoreError,
    schema::{CollectedRecord, Cursor, EnrichedVendor, RecoverySnapshot},
};

pub mod redis_progress;
pub mod sql;

#[cfg(test)]
pub mod memory;

/// What an upsert does when the natural key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Measurement fields stay as first written; only the refresh
    /// timestamp moves
    KeepExisting,
    /// Every field is replaced
    Overwrite,
}

/// Row counts of one upsert call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub submitted: usize,
    pub inserted: usize,
    pub updated: usize,
}

/// Tables whose freshness can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Products,
    Records,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Records => "records",
        }
    }
}

/// Primary store.
///
/// CONTRACT:
/// - Every upsert is idempotent under retry
/// - Every call is all-or-nothing; on error nothing was written
#[async_trait::async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Current product list, ranking order.
    async fn product_keys(&self) -> Result<Vec<String>, StoreError>;

    async fn location_keys(&self) -> Result<Vec<String>, StoreError>;

    /// Vendors that already have coordinates.
    async fn known_vendor_ids(&self) -> Result<HashSet<String>, StoreError>;

    /// Most recent refresh timestamp of `table`, `None` when empty.
    async fn latest_update(&self, table: Table) -> Result<Option<NaiveDateTime>, StoreError>;

    async fn upsert_records(
        &self,
        records: &[CollectedRecord],
        policy: ConflictPolicy,
        refreshed_at: NaiveDateTime,
    ) -> Result<UpsertReport, StoreError>;

    async fn upsert_vendors(
        &self,
        vendors: &[EnrichedVendor],
        policy: ConflictPolicy,
        refreshed_at: NaiveDateTime,
    ) -> Result<UpsertReport, StoreError>;
}

/// Cursor and recovery snapshot.
///
/// While a snapshot exists, its embedded cursor is the resume point;
/// `drain_snapshot` removes the snapshot and promotes that cursor in
/// one step.
#[async_trait::async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load_cursor(&self) -> Result<Cursor, StoreError>;

    async fn save_cursor(&self, cursor: &Cursor) -> Result<(), StoreError>;

    async fn stage_snapshot(&self, snapshot: &RecoverySnapshot) -> Result<(), StoreError>;

    async fn load_snapshot(&self) -> Result<Option<RecoverySnapshot>, StoreError>;

    async fn drain_snapshot(&self, cursor: &Cursor) -> Result<(), StoreError>;
}
