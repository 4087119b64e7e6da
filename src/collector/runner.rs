use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::{
    batch::{SelectReason, select_next_batch},
    config::Config,
    error::{RunError, StoreError},
    metrics::RunMetrics,
    schema::{CollectedRecord, RecoverySnapshot, UnregisteredVendor},
    services::{
        adapter::{Geocoder, Notifier, PricingApi},
        geocoding::VendorEnricher,
    },
    storage::{ConflictPolicy, PersistenceGateway, ProgressStore, Table, UpsertReport},
    universe::{EmptyUniverse, Universe},
    util,
};

use super::{
    engine::{CollectionEngine, CompletionState},
    observer::LogObserver,
    recovery::{self, RecoveryReport},
};

/// Summary of a batch run that reached the commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Zero-based batch number and batch count
    pub number: usize,
    pub total: usize,
    pub state: CompletionState,
    pub records: UpsertReport,
    pub vendors: UpsertReport,
    /// Product list is older than the refresh window
    pub refresh_due: bool,
}

/// How one run ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A pending snapshot was committed; no batch was consumed
    Recovered(RecoveryReport),
    /// Product or location list is empty
    NothingToDo(EmptyUniverse),
    Batch(BatchSummary),
}

/// Starts runs and decides what happens between them.
///
/// One run is either:
/// - a recovery pass, when a snapshot is pending, or
/// - refresh check → universe → selection → collection → commit
///   → cursor save
///
/// This type does NOT:
/// - talk HTTP itself (services)
/// - know SQL or redis (storage)
pub struct Runner {
    config: Config,
    api: Arc<dyn PricingApi>,
    geocoder: Arc<dyn Geocoder>,
    gateway: Arc<dyn PersistenceGateway>,
    progress: Arc<dyn ProgressStore>,
}

impl Runner {
    pub fn new(
        config: Config,
        api: Arc<dyn PricingApi>,
        geocoder: Arc<dyn Geocoder>,
        gateway: Arc<dyn PersistenceGateway>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            config,
            api,
            geocoder,
            gateway,
            progress,
        }
    }

    /// Runs until the process has nothing more to do.
    ///
    /// - recovery pass        → notify, run again
    /// - partial batch        → notify, wait, run again (bounded)
    /// - completed / nothing  → notify, stop
    /// - failure              → notify, stop
    ///
    /// Returns false when the last run failed.
    pub async fn serve(&self, notifier: &dyn Notifier) -> bool {
        let schedule = &self.config.schedule;
        let mut resumes = 0;

        loop {
            let metrics = Arc::new(RunMetrics::default());
            let result = self.run_once(metrics.clone()).await;
            log::info!("{}", metrics);

            notifier.notify(&self.message(&result)).await;

            match result {
                Ok(RunOutcome::Recovered(_)) => continue,

                Ok(RunOutcome::Batch(summary))
                    if summary.state == CompletionState::PartialApiFailure =>
                {
                    if resumes >= schedule.max_resumes {
                        log::warn!(
                            "[RUN] resume limit ({}) reached, leaving the batch to the next schedule",
                            schedule.max_resumes
                        );
                        return true;
                    }
                    resumes += 1;
                    log::info!(
                        "[RUN] resuming in {}s ({}/{})",
                        schedule.resume_delay_secs,
                        resumes,
                        schedule.max_resumes
                    );
                    sleep(Duration::from_secs(schedule.resume_delay_secs)).await;
                }

                Ok(_) => return true,

                Err(e) => {
                    log::error!("[RUN] {}", e);
                    return false;
                }
            }
        }
    }

    /// One run.
    pub async fn run_once(&self, metrics: Arc<RunMetrics>) -> Result<RunOutcome, RunError> {
        let now = util::now_local(self.config.utc_offset_hours).naive_local();
        let enricher = VendorEnricher::new(self.geocoder.clone(), metrics.clone(), &self.config.geocoding);

        // ------------------------------------------------------------
        // Pending snapshot takes over the run
        // ------------------------------------------------------------
        if let Some(snapshot) = self.progress.load_snapshot().await.map_err(RunError::Progress)? {
            let report = recovery::drain(
                snapshot,
                self.gateway.as_ref(),
                self.progress.as_ref(),
                &enricher,
                now,
            )
            .await?;
            return Ok(RunOutcome::Recovered(report));
        }

        // ------------------------------------------------------------
        // Refresh check (reporting only, the ranking ETL is external)
        // ------------------------------------------------------------
        let last_refresh = self
            .gateway
            .latest_update(Table::Products)
            .await
            .map_err(RunError::from_gateway)?;
        let refresh_due = util::refresh_due(last_refresh, now.date(), self.config.refresh.max_age_days);
        if refresh_due {
            log::warn!(
                "[RUN] product list older than {} days (last refresh: {:?})",
                self.config.refresh.max_age_days,
                last_refresh
            );
        }

        let last_commit = self
            .gateway
            .latest_update(Table::Records)
            .await
            .map_err(RunError::from_gateway)?;
        if let Some(ts) = last_commit {
            log::info!("[RUN] last record commit at {}", ts);
        }

        // ------------------------------------------------------------
        // Universe and batch
        // ------------------------------------------------------------
        let products = self.gateway.product_keys().await.map_err(RunError::from_gateway)?;
        let locations = self.gateway.location_keys().await.map_err(RunError::from_gateway)?;

        let universe = match Universe::build(&products, &locations) {
            Ok(u) => u,
            Err(empty) => {
                log::warn!("[RUN] {}", empty);
                return Ok(RunOutcome::NothingToDo(empty));
            }
        };

        let cursor = self.progress.load_cursor().await.map_err(RunError::Progress)?;
        let selection = select_next_batch(&universe, &cursor, self.config.batch.size);

        if selection.reason == SelectReason::KeyNotFound {
            log::warn!("[BATCH] {}", selection.reason);
        } else {
            log::info!("[BATCH] {}", selection.reason);
        }
        log::info!(
            "[BATCH] {}/{} via {}: {} of {} units pending ({} units in universe)",
            selection.number + 1,
            selection.total,
            self.api.name(),
            selection.pending().len(),
            selection.units().len(),
            universe.len()
        );

        // ------------------------------------------------------------
        // Collection
        // ------------------------------------------------------------
        let known = self
            .gateway
            .known_vendor_ids()
            .await
            .map_err(RunError::from_gateway)?;

        let verbose = self
            .config
            .debug
            .as_ref()
            .is_some_and(|d| d.log.unwrap_or(false));
        let observer = Arc::new(LogObserver::new(metrics, verbose));
        let engine = CollectionEngine::new(self.api.clone(), observer, &self.config.pricing);

        let outcome = engine.run(selection.pending(), &known).await?;
        let next_cursor = selection.cursor_after(outcome.is_completed(), outcome.last_advanced);

        // ------------------------------------------------------------
        // Commit, or stage when the primary store is unreachable
        // ------------------------------------------------------------
        let (records, vendors) = match self
            .commit(&outcome.records, &outcome.vendors, &enricher, now)
            .await
        {
            Ok(reports) => reports,
            Err(e) if e.is_connectivity() => {
                let snapshot = RecoverySnapshot {
                    records: outcome.records,
                    vendors: outcome.vendors,
                    cursor: next_cursor,
                };
                let staged = recovery::stage(self.progress.as_ref(), &snapshot).await;
                return Err(RunError::StorageConnectivity { source: e, staged });
            }
            Err(e) => return Err(RunError::StorageIntegrity(e)),
        };

        self.progress
            .save_cursor(&next_cursor)
            .await
            .map_err(RunError::Progress)?;

        Ok(RunOutcome::Batch(BatchSummary {
            number: selection.number,
            total: selection.total,
            state: outcome.state,
            records,
            vendors,
            refresh_due,
        }))
    }

    /// Records first, then the enriched vendors.
    async fn commit(
        &self,
        records: &[CollectedRecord],
        vendors: &[UnregisteredVendor],
        enricher: &VendorEnricher,
        now: chrono::NaiveDateTime,
    ) -> Result<(UpsertReport, UpsertReport), StoreError> {
        let record_report = if records.is_empty() {
            UpsertReport::default()
        } else {
            self.gateway
                .upsert_records(records, ConflictPolicy::KeepExisting, now)
                .await?
        };

        let vendor_report = if vendors.is_empty() {
            UpsertReport::default()
        } else {
            let enriched = enricher.enrich(vendors.to_vec()).await;
            self.gateway
                .upsert_vendors(&enriched, ConflictPolicy::KeepExisting, now)
                .await?
        };

        Ok((record_report, vendor_report))
    }

    /// Operator message for one run, prefixed with local time.
    fn message(&self, result: &Result<RunOutcome, RunError>) -> String {
        let body = match result {
            Ok(RunOutcome::Recovered(r)) => format!(
                "Recovery completed: {} records and {} vendors committed from the staged snapshot ({} vendors looked up).",
                r.records.submitted, r.vendors.submitted, r.looked_up
            ),
            Ok(RunOutcome::NothingToDo(e)) => format!("Nothing to collect: {e}."),
            Ok(RunOutcome::Batch(s)) => {
                let head = match s.state {
                    CompletionState::Completed => "Batch completed",
                    CompletionState::PartialApiFailure => {
                        "Batch interrupted by pricing API failures"
                    }
                };
                let mut text = format!(
                    "{head} ({}/{}): {} records ({} new), {} new vendors.",
                    s.number + 1,
                    s.total,
                    s.records.submitted,
                    s.records.inserted,
                    s.vendors.submitted
                );
                if s.refresh_due {
                    text.push_str(&format!(
                        " Product list is older than {} days, refresh due.",
                        self.config.refresh.max_age_days
                    ));
                }
                text
            }
            Err(RunError::FatalApi(e)) => format!("Collection aborted: {e}."),
            Err(e @ RunError::StorageConnectivity { staged: true, .. }) => {
                format!("Commit failed, results staged for recovery: {e}.")
            }
            Err(e) => format!("Run failed: {e}."),
        };

        format!(
            "[mp-feeder] {} {}",
            util::now_local(self.config.utc_offset_hours).format("%d/%m/%Y %H:%M:%S"),
            body
        )
    }
}
