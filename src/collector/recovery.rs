use chrono::NaiveDateTime;

use crate::{
    error::{RunError, StoreError},
    schema::RecoverySnapshot,
    services::geocoding::VendorEnricher,
    storage::{ConflictPolicy, PersistenceGateway, ProgressStore, UpsertReport},
};

/// What a recovery pass committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub records: UpsertReport,
    pub vendors: UpsertReport,
    /// Staged vendors that were still unregistered and got looked up
    pub looked_up: usize,
}

/// Stages results the primary store could not take.
///
/// Returns whether the snapshot is now durable. A staging failure is
/// logged as critical; the caller still reports the run.
pub async fn stage(progress: &dyn ProgressStore, snapshot: &RecoverySnapshot) -> bool {
    if snapshot.is_empty() {
        return false;
    }

    match progress.stage_snapshot(snapshot).await {
        Ok(()) => {
            log::warn!(
                "[RECOVERY] staged {} records and {} vendors",
                snapshot.records.len(),
                snapshot.vendors.len()
            );
            true
        }
        Err(e) => {
            log::error!(
                "[RECOVERY] CRITICAL: staging failed, {} records and {} vendors are lost: {}",
                snapshot.records.len(),
                snapshot.vendors.len(),
                e
            );
            false
        }
    }
}

/// Commits a pending snapshot and promotes its cursor.
///
/// Steps:
/// - keep only vendors still outside the known set
/// - enrich those
/// - upsert records, then vendors
/// - delete the snapshot and promote its cursor in one step
///
/// On any gateway failure the snapshot stays in place.
pub async fn drain(
    snapshot: RecoverySnapshot,
    gateway: &dyn PersistenceGateway,
    progress: &dyn ProgressStore,
    enricher: &VendorEnricher,
    now: NaiveDateTime,
) -> Result<RecoveryReport, RunError> {
    log::info!(
        "[RECOVERY] draining snapshot: {} records, {} vendors",
        snapshot.records.len(),
        snapshot.vendors.len()
    );

    let known = gateway.known_vendor_ids().await.map_err(still_staged)?;
    let unresolved: Vec<_> = snapshot
        .vendors
        .into_iter()
        .filter(|v| !known.contains(&v.vendor_id))
        .collect();
    let looked_up = unresolved.len();

    let enriched = enricher.enrich(unresolved).await;

    let records = gateway
        .upsert_records(&snapshot.records, ConflictPolicy::KeepExisting, now)
        .await
        .map_err(still_staged)?;

    let vendors = if enriched.is_empty() {
        UpsertReport::default()
    } else {
        gateway
            .upsert_vendors(&enriched, ConflictPolicy::KeepExisting, now)
            .await
            .map_err(still_staged)?
    };

    progress
        .drain_snapshot(&snapshot.cursor)
        .await
        .map_err(RunError::Progress)?;

    log::info!(
        "[RECOVERY] committed {} records ({} new, {} updated), {} vendors",
        records.submitted,
        records.inserted,
        records.updated,
        vendors.submitted
    );

    Ok(RecoveryReport {
        records,
        vendors,
        looked_up,
    })
}

fn still_staged(e: StoreError) -> RunError {
    match e {
        StoreError::Connectivity(_) => RunError::StorageConnectivity {
            source: e,
            staged: true,
        },
        StoreError::Integrity(_) => RunError::StorageIntegrity(e),
    }
}
