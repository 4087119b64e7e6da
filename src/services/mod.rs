/// Services module
///
/// Clients for the external systems the feeder talks to:
/// - `menor_preco`: public price-comparison API (pricing lookups)
/// - `nominatim`:   public geocoder
/// - `geocoding`:   rate-limited vendor enrichment on top of a geocoder
/// - `telegram`:    operator notification
///
/// The engine and the run controller only see the traits in `adapter`.
pub mod adapter;
pub mod geocoding;
pub mod menor_preco;
pub mod nominatim;
pub mod telegram;

#[cfg(test)]
pub mod fake;

use std::sync::Arc;

use crate::config::NotifierConfig;

use adapter::Notifier;
use telegram::{LogNotifier, TelegramNotifier};

/// Returns the notifier for this configuration.
///
/// Missing configuration, or `demo: true`, selects the log-only
/// notifier.
pub fn build_notifier(cfg: Option<&NotifierConfig>) -> anyhow::Result<Arc<dyn Notifier>> {
    match cfg {
        Some(c) if !c.demo => Ok(Arc::new(TelegramNotifier::new(c)?)),
        _ => {
            log::warn!("Notifier running in DEMO mode");
            Ok(Arc::new(LogNotifier))
        }
    }
}
