use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::{
    config::GeocodingConfig,
    metrics::RunMetrics,
    schema::{EnrichedVendor, UnregisteredVendor},
    util,
};

use super::adapter::Geocoder;

/// Rate-limited vendor enrichment.
///
/// - One lookup at a time, `delay` between two lookups
/// - At most `max_per_run` lookups; vendors past the cap are returned
///   without coordinates and stay unregistered for a later run
/// - Input order is preserved
pub struct VendorEnricher {
    geocoder: Arc<dyn Geocoder>,
    metrics: Arc<RunMetrics>,
    delay: Duration,
    max_per_run: usize,
    region: String,
    country: String,
}

impl VendorEnricher {
    pub fn new(geocoder: Arc<dyn Geocoder>, metrics: Arc<RunMetrics>, cfg: &GeocodingConfig) -> Self {
        Self {
            geocoder,
            metrics,
            delay: Duration::from_millis(cfg.delay_ms),
            max_per_run: cfg.max_per_run,
            region: cfg.region.clone(),
            country: cfg.country.clone(),
        }
    }

    pub async fn enrich(&self, vendors: Vec<UnregisteredVendor>) -> Vec<EnrichedVendor> {
        let total = vendors.len();
        let mut out = Vec::with_capacity(total);
        let mut lookups = 0;

        for vendor in vendors {
            if lookups >= self.max_per_run {
                out.push(EnrichedVendor {
                    vendor,
                    coordinates: None,
                });
                continue;
            }

            let address = util::clean_address(
                &format!("{}, {}", vendor.street_address, vendor.city),
                &self.region,
                &self.country,
            );

            if lookups > 0 {
                sleep(self.delay).await;
            }
            lookups += 1;
            RunMetrics::add(&self.metrics.geocode_lookups, 1);

            let coordinates = self.geocoder.locate(&address).await;
            if coordinates.is_none() {
                RunMetrics::add(&self.metrics.geocode_misses, 1);
                log::debug!("[GEO] no match for vendor {} ({})", vendor.vendor_id, address);
            }

            out.push(EnrichedVendor {
                vendor,
                coordinates,
            });
        }

        if total > lookups {
            log::info!(
                "[GEO] {} of {} vendors deferred to a later run (cap {})",
                total - lookups,
                total,
                self.max_per_run
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fake::FixedGeocoder;

    fn vendor(i: usize) -> UnregisteredVendor {
        UnregisteredVendor {
            vendor_id: format!("v{i}"),
            display_name: format!("LOJA {i}"),
            legal_name: format!("LOJA {i} LTDA"),
            street_address: format!("Rua das Flores, {i}"),
            city: "Curitiba (Município".into(),
            location_key: "6gkzwgj".into(),
        }
    }

    fn config() -> GeocodingConfig {
        GeocodingConfig {
            delay_ms: 0,
            ..GeocodingConfig::default()
        }
    }

    #[tokio::test]
    async fn lookups_are_capped_per_run() {
        let geocoder = Arc::new(FixedGeocoder::hit());
        let metrics = Arc::new(RunMetrics::default());
        let enricher = VendorEnricher::new(geocoder.clone(), metrics.clone(), &config());

        let out = enricher.enrich((0..120).map(vendor).collect()).await;

        assert_eq!(out.len(), 120);
        assert_eq!(geocoder.queries().len(), 100);
        assert!(out[..100].iter().all(|v| v.coordinates.is_some()));
        assert!(out[100..].iter().all(|v| v.coordinates.is_none()));
        assert_eq!(out[119].vendor.vendor_id, "v119");
        assert_eq!(RunMetrics::get(&metrics.geocode_lookups), 100);
    }

    #[tokio::test]
    async fn addresses_are_cleaned_before_lookup() {
        let geocoder = Arc::new(FixedGeocoder::miss());
        let metrics = Arc::new(RunMetrics::default());
        let enricher = VendorEnricher::new(geocoder.clone(), metrics.clone(), &config());

        let out = enricher.enrich(vec![vendor(7)]).await;

        assert!(out[0].coordinates.is_none());
        assert_eq!(
            geocoder.queries(),
            vec!["RUA DAS FLORES, 7, CURITIBA, PR, BRASIL".to_string()]
        );
        assert_eq!(RunMetrics::get(&metrics.geocode_misses), 1);
    }
}
