use std::sync::Arc;

use crate::{
    error::ApiError,
    metrics::RunMetrics,
    schema::QueryUnit,
};

use super::engine::CompletionState;

/// Things worth reporting while a batch is collected.
#[derive(Debug)]
pub enum CollectEvent<'a> {
    RequestSent {
        unit: &'a QueryUnit,
        attempt: u32,
    },
    UnitCollected {
        unit: &'a QueryUnit,
        records: usize,
        new_vendors: usize,
    },
    UnitEmpty {
        unit: &'a QueryUnit,
    },
    UnitSkipped {
        unit: &'a QueryUnit,
        error: &'a ApiError,
    },
    TransientFailure {
        unit: &'a QueryUnit,
        error: &'a ApiError,
        attempt: u32,
        consecutive: u32,
    },
    /// Attempts for this unit are exhausted; the batch stops in front of it
    UnitAbandoned {
        unit: &'a QueryUnit,
        attempts: u32,
    },
    BreakerTripped {
        unit: &'a QueryUnit,
        consecutive: u32,
    },
    Fatal {
        unit: &'a QueryUnit,
        error: &'a ApiError,
    },
    BatchFinished {
        state: CompletionState,
        records: usize,
        vendors: usize,
        last_advanced: Option<usize>,
    },
}

/// Receives engine events. Injected into the engine; implementations
/// must not block.
pub trait CollectObserver: Send + Sync {
    fn on_event(&self, event: &CollectEvent<'_>);
}

/// Default observer: log lines plus run-owned counters.
///
/// Per-request lines are written at info with `verbose` and at debug
/// without it; everything that goes wrong is always logged.
pub struct LogObserver {
    metrics: Arc<RunMetrics>,
    verbose: bool,
}

impl LogObserver {
    pub fn new(metrics: Arc<RunMetrics>, verbose: bool) -> Self {
        Self { metrics, verbose }
    }

    fn detail_level(&self) -> log::Level {
        if self.verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }
}

impl CollectObserver for LogObserver {
    fn on_event(&self, event: &CollectEvent<'_>) {
        let m = &self.metrics;
        let detail = self.detail_level();

        match event {
            CollectEvent::RequestSent { unit, attempt } => {
                RunMetrics::add(&m.requests_sent, 1);
                log::log!(
                    detail,
                    "[PRICING] #{} {}@{} attempt {}",
                    unit.sequence_index,
                    unit.product_key,
                    unit.location_key,
                    attempt
                );
            }

            CollectEvent::UnitCollected { unit, records, new_vendors } => {
                RunMetrics::add(&m.units_with_data, 1);
                log::log!(
                    detail,
                    "[PRICING] #{} {} records, {} new vendors",
                    unit.sequence_index,
                    records,
                    new_vendors
                );
            }

            CollectEvent::UnitEmpty { unit } => {
                RunMetrics::add(&m.units_empty, 1);
                log::log!(detail, "[PRICING] #{} no data", unit.sequence_index);
            }

            CollectEvent::UnitSkipped { unit, error } => {
                RunMetrics::add(&m.units_skipped, 1);
                log::warn!(
                    "[PRICING] #{} {} skipped: {}",
                    unit.sequence_index,
                    unit.key(),
                    error
                );
            }

            CollectEvent::TransientFailure { unit, error, attempt, consecutive } => {
                RunMetrics::add(&m.transient_errors, 1);
                log::warn!(
                    "[PRICING] #{} {} attempt {} failed ({} in a row): {}",
                    unit.sequence_index,
                    unit.key(),
                    attempt,
                    consecutive,
                    error
                );
            }

            CollectEvent::UnitAbandoned { unit, attempts } => {
                log::error!(
                    "[PRICING] #{} {} still failing after {} attempts, batch stops here",
                    unit.sequence_index,
                    unit.key(),
                    attempts
                );
            }

            CollectEvent::BreakerTripped { unit, consecutive } => {
                log::error!(
                    "[PRICING] circuit breaker open after {} consecutive failures at #{}",
                    consecutive,
                    unit.sequence_index
                );
            }

            CollectEvent::Fatal { unit, error } => {
                log::error!(
                    "[PRICING] fatal answer at #{} {}: {}",
                    unit.sequence_index,
                    unit.key(),
                    error
                );
            }

            CollectEvent::BatchFinished { state, records, vendors, last_advanced } => {
                RunMetrics::add(&m.records_collected, *records);
                RunMetrics::add(&m.vendors_discovered, *vendors);
                log::info!(
                    "[PRICING] batch {:?}: {} records, {} new vendors, last advanced {:?}",
                    state,
                    records,
                    vendors,
                    last_advanced
                );
            }
        }
    }
}
