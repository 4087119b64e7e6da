// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:    Configuration structs loaded from JSON
// - schema:    Query units, collected records, vendors, cursor, wire types
// - util:      Shared helpers (timestamps, prices, addresses, padding)
// - error:     Error taxonomy (API, store, run)
// - metrics:   Per-run counters
// - universe:  Product × location cross product
// - batch:     Batch selection from the persisted cursor
// - services:  Pricing API, geocoder and notifier clients
// - storage:   Primary store and progress store
// - collector: Collection engine, recovery and run controller
//
mod batch;
mod collector;
mod config;
mod error;
mod metrics;
mod schema;
mod services;
mod storage;
mod universe;
mod util;

// ------------------------------------------------------------
// External dependencies
// ------------------------------------------------------------

use std::fs;
use std::sync::Arc;

use config::Config;
use collector::runner::Runner;
use services::{build_notifier, menor_preco::MenorPrecoClient, nominatim::NominatimGeocoder};
use storage::{redis_progress::RedisProgressStore, sql::SqlGateway};

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// One invocation of the feeder, started by an external scheduler.
//
// Responsibilities:
// - Initialize logging
// - Load and validate configuration
// - Connect the primary store and the progress store
// - Build the API clients and the notifier
// - Run until the current batch is done (or cannot be done)
//
// Exit code 1 when the last run failed.
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --------------------------------------------------------
    // Load configuration from disk
    //
    // NOTE:
    // - The config file contains credentials inside URLs
    //   (messaging token, database password).
    // - It must not be committed to version control.
    // --------------------------------------------------------
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.json".into());
    let config = load_config(&path)?;

    let notifier = build_notifier(config.notifier.as_ref())?;

    // --------------------------------------------------------
    // Durable stores
    //
    // Failing to reach either store before any work is done is
    // reported and ends the process; nothing needs staging yet.
    // --------------------------------------------------------
    let gateway = match SqlGateway::connect(&config.store).await {
        Ok(g) => g,
        Err(e) => {
            notifier
                .notify(&format!("[mp-feeder] primary store unavailable: {e}"))
                .await;
            return Err(e);
        }
    };

    let progress = match RedisProgressStore::connect(&config.progress).await {
        Ok(p) => p,
        Err(e) => {
            notifier
                .notify(&format!("[mp-feeder] progress store unavailable: {e}"))
                .await;
            return Err(e.into());
        }
    };

    let api = MenorPrecoClient::new(&config.pricing)?;
    let geocoder = NominatimGeocoder::new(&config.geocoding)?;

    log::info!(
        "Starting feeder: batch size {}, throttle {}ms, breaker at {} consecutive failures",
        config.batch.size,
        config.pricing.throttle_ms,
        config.pricing.error_threshold
    );

    let runner = Runner::new(
        config,
        Arc::new(api),
        Arc::new(geocoder),
        Arc::new(gateway),
        Arc::new(progress),
    );

    if !runner.serve(notifier.as_ref()).await {
        std::process::exit(1);
    }

    Ok(())
}

// ------------------------------------------------------------
// Configuration loader
// ------------------------------------------------------------
//
// Reads a JSON configuration file from disk, deserializes it into
// the strongly typed `Config` structure and rejects values the
// engine cannot work with.
//
fn load_config(path: &str) -> anyhow::Result<Config> {
    let data = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read config '{}': {}", path, e))?;
    let cfg: Config = serde_json::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}
