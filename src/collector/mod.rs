/// Collector module
///
/// This module groups all logic responsible for:
/// - Driving one batch through the pricing API (engine)
/// - Retry, skip and circuit-breaker decisions (retry)
/// - Reporting what the engine does (observer)
/// - Staging and draining uncommitted results (recovery)
/// - Sequencing a whole run and the runs of one process (runner)
///
/// Design notes:
/// - API-specific logic MUST NOT live here; it belongs to `services`
/// - Storage-specific logic MUST NOT live here; it belongs to `storage`
pub mod engine;
pub mod observer;
pub mod recovery;
pub mod retry;
pub mod runner;
