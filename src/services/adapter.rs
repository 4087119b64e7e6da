use crate::error::ApiError;
use crate::schema::{ApiProduct, Coordinates, QueryUnit};

/// Result of a pricing lookup that the upstream answered normally.
///
/// `Found` may carry an empty list (HTTP 200 with no items); that is
/// a different wire answer from `NoContent` (HTTP 204) but the engine
/// treats both as "success, nothing to collect".
#[derive(Debug, Clone)]
pub enum PriceLookup {
    Found(Vec<ApiProduct>),
    NoContent,
}

/// PricingApi is the seam between the collection engine and the
/// public price-comparison API.
///
/// Implementations must:
/// - Issue exactly one request per call (no internal retries; the
///   engine owns retry and circuit-breaker policy)
/// - Enforce their own request timeout
/// - Map every non-200/204 status to `ApiError::Status`
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - The engine calls it strictly sequentially
///
#[async_trait::async_trait]
pub trait PricingApi: Send + Sync {

    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Looks up the prices for one (product, location) pair.
    async fn lookup(&self, unit: &QueryUnit) -> Result<PriceLookup, ApiError>;
}

/// Geocoder resolves a free-text address into coordinates.
///
/// CONTRACT:
/// - Never fails: any error, non-200 answer or empty result is `None`
/// - Rate limiting is the caller's job (see `services::geocoding`)
///
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, address: &str) -> Option<Coordinates>;
}

/// Operator notification channel.
///
/// Fire-and-forget: failures are logged by the implementation and
/// never reach the caller.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}
