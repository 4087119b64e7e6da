use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::{
    config::PricingConfig,
    error::{ApiError, FatalApiError},
    schema::{CollectedRecord, QueryUnit, UnregisteredVendor},
    services::adapter::{PriceLookup, PricingApi},
    util,
};

use super::{
    observer::{CollectEvent, CollectObserver},
    retry::{CircuitBreaker, Disposition, RetryPolicy},
};

/// How a batch pass ended, when it did not abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// Every pending unit was handled
    Completed,
    /// The breaker tripped or a unit ran out of attempts; that unit and
    /// the rest of the batch are pending
    PartialApiFailure,
}

/// Results of one batch pass.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Deduplicated by `record_id`, timestamps normalized
    pub records: Vec<CollectedRecord>,

    /// Vendors outside the known set, deduplicated by `vendor_id`
    pub vendors: Vec<UnregisteredVendor>,

    pub state: CompletionState,

    /// Sequence index of the last unit the cursor may move past
    pub last_advanced: Option<usize>,
}

impl BatchOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == CompletionState::Completed
    }
}

/// ============================================================
/// CollectionEngine
/// ============================================================
///
/// Drives one batch through the pricing API, strictly sequentially.
///
/// Per unit:
/// - throttle to the minimum request interval (retries included)
/// - classify the answer through the retry policy
/// - success (with or without data) resets the breaker and advances
/// - skip advances only while no failure streak is open
/// - transient failures feed the breaker and are retried on the same
///   unit; nothing after it is requested until it resolves
///
/// TERMINATION:
/// - breaker trips     → `PartialApiFailure`, accumulated results kept
/// - attempts run out  → `PartialApiFailure`, cursor stays before the unit
/// - fatal answer      → `Err(FatalApiError)`, nothing more is sent
/// - end of the batch  → `Completed`
pub struct CollectionEngine {
    api: Arc<dyn PricingApi>,
    observer: Arc<dyn CollectObserver>,
    policy: RetryPolicy,
    throttle: Duration,
    error_threshold: u32,
}

impl CollectionEngine {
    pub fn new(
        api: Arc<dyn PricingApi>,
        observer: Arc<dyn CollectObserver>,
        cfg: &PricingConfig,
    ) -> Self {
        Self {
            api,
            observer,
            policy: RetryPolicy::from_config(cfg),
            throttle: Duration::from_millis(cfg.throttle_ms),
            error_threshold: cfg.error_threshold,
        }
    }

    /// Runs `pending` in order.
    ///
    /// `known_vendors` holds the vendor ids already registered; only
    /// vendors outside it are reported back.
    pub async fn run(
        &self,
        pending: &[QueryUnit],
        known_vendors: &HashSet<String>,
    ) -> Result<BatchOutcome, FatalApiError> {
        let mut breaker = CircuitBreaker::new(self.error_threshold);
        let mut last_request: Option<Instant> = None;

        let mut records = Vec::new();
        let mut vendors = Vec::new();
        let mut seen_vendors = HashSet::new();
        let mut last_advanced = None;
        let mut state = CompletionState::Completed;

        'units: for unit in pending {
            let mut attempt = 0;

            loop {
                attempt += 1;
                self.pace(&mut last_request).await;
                self.observer
                    .on_event(&CollectEvent::RequestSent { unit, attempt });

                let error = match self.api.lookup(unit).await {
                    Ok(lookup) => {
                        breaker.reset();
                        last_advanced = Some(unit.sequence_index);

                        let items = match lookup {
                            PriceLookup::Found(items) => items,
                            PriceLookup::NoContent => Vec::new(),
                        };

                        if items.is_empty() {
                            self.observer.on_event(&CollectEvent::UnitEmpty { unit });
                            continue 'units;
                        }

                        let records_before = records.len();
                        let vendors_before = vendors.len();

                        for item in &items {
                            if let Some(record) = item.to_record(unit) {
                                records.push(record);
                            }
                            if let Some(vendor) = item.to_vendor(unit) {
                                if !known_vendors.contains(&vendor.vendor_id)
                                    && seen_vendors.insert(vendor.vendor_id.clone())
                                {
                                    vendors.push(vendor);
                                }
                            }
                        }

                        self.observer.on_event(&CollectEvent::UnitCollected {
                            unit,
                            records: records.len() - records_before,
                            new_vendors: vendors.len() - vendors_before,
                        });
                        continue 'units;
                    }
                    Err(error) => error,
                };

                match self.policy.classify(&error) {
                    Disposition::Fatal => {
                        self.observer
                            .on_event(&CollectEvent::Fatal { unit, error: &error });
                        let status = match error {
                            ApiError::Status(s) => s,
                            _ => 0,
                        };
                        return Err(FatalApiError {
                            status,
                            unit: unit.key(),
                        });
                    }

                    Disposition::Skip => {
                        self.observer
                            .on_event(&CollectEvent::UnitSkipped { unit, error: &error });
                        if breaker.is_clean() {
                            last_advanced = Some(unit.sequence_index);
                        }
                        continue 'units;
                    }

                    Disposition::Retry => {
                        let tripped = breaker.record_failure();
                        self.observer.on_event(&CollectEvent::TransientFailure {
                            unit,
                            error: &error,
                            attempt,
                            consecutive: breaker.consecutive(),
                        });

                        if tripped {
                            self.observer.on_event(&CollectEvent::BreakerTripped {
                                unit,
                                consecutive: breaker.consecutive(),
                            });
                            state = CompletionState::PartialApiFailure;
                            break 'units;
                        }

                        if !self.policy.should_retry(attempt) {
                            self.observer
                                .on_event(&CollectEvent::UnitAbandoned { unit, attempts: attempt });
                            state = CompletionState::PartialApiFailure;
                            break 'units;
                        }

                        sleep(self.policy.backoff(attempt)).await;
                    }
                }
            }
        }

        dedup_records(&mut records);
        for record in &mut records {
            record.timestamp = record
                .timestamp
                .as_deref()
                .and_then(util::normalize_timestamp);
        }

        self.observer.on_event(&CollectEvent::BatchFinished {
            state,
            records: records.len(),
            vendors: vendors.len(),
            last_advanced,
        });

        Ok(BatchOutcome {
            records,
            vendors,
            state,
            last_advanced,
        })
    }

    /// Waits until `throttle` has passed since the previous request.
    async fn pace(&self, last_request: &mut Option<Instant>) {
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.throttle {
                sleep(self.throttle - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

/// First occurrence of every `record_id` wins.
fn dedup_records(records: &mut Vec<CollectedRecord>) {
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.record_id.clone()));
}
