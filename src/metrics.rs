use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Runtime metrics for one feeder run.
///
/// Purpose:
/// - Track pricing requests and how they were classified
/// - Track collected records and discovered vendors
/// - Track geocoding lookups
///
/// Design:
/// - Lock-free (Atomics)
/// - Owned by the run and shared through `Arc`, never a global
#[derive(Default, Debug)]
pub struct RunMetrics {
    // Pricing API
    pub requests_sent: AtomicUsize,
    pub units_with_data: AtomicUsize,
    pub units_empty: AtomicUsize,
    pub units_skipped: AtomicUsize,
    pub transient_errors: AtomicUsize,

    // Results
    pub records_collected: AtomicUsize,
    pub vendors_discovered: AtomicUsize,

    // Geocoding
    pub geocode_lookups: AtomicUsize,
    pub geocode_misses: AtomicUsize,
}

impl RunMetrics {
    pub fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }
}

impl fmt::Display for RunMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[METRICS] req={} data={} empty={} skipped={} transient={} records={} vendors={} geo={} geo_miss={}",
            Self::get(&self.requests_sent),
            Self::get(&self.units_with_data),
            Self::get(&self.units_empty),
            Self::get(&self.units_skipped),
            Self::get(&self.transient_errors),
            Self::get(&self.records_collected),
            Self::get(&self.vendors_discovered),
            Self::get(&self.geocode_lookups),
            Self::get(&self.geocode_misses),
        )
    }
}
