use serde::Deserialize;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level configuration loaded from `config.json`.
//
// Every section has defaults, so a minimal file only needs the
// store and progress URLs. Credentials (messaging token, database
// password) live inside the URLs and must not be committed.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub pricing: PricingConfig,
    pub batch: BatchConfig,
    pub geocoding: GeocodingConfig,
    pub store: StoreConfig,
    pub progress: ProgressConfig,

    /// Optional operator notification channel. Without it messages
    /// are only logged (demo mode).
    pub notifier: Option<NotifierConfig>,

    pub refresh: RefreshConfig,
    pub schedule: ScheduleConfig,

    /// Offset of the operator's local time from UTC, in hours
    pub utc_offset_hours: i32,

    pub debug: Option<DebugConfig>,
}

impl Config {
    /// Rejects values that would make the engine spin or stall.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.batch.size > 0, "batch.size must be greater than zero");
        anyhow::ensure!(
            self.pricing.error_threshold > 0,
            "pricing.error_threshold must be greater than zero"
        );
        anyhow::ensure!(
            self.pricing.max_attempts > 0,
            "pricing.max_attempts must be greater than zero"
        );
        anyhow::ensure!(
            !self.geocoding.user_agent.trim().is_empty(),
            "geocoding.user_agent is mandatory for the public geocoder"
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pricing: PricingConfig::default(),
            batch: BatchConfig::default(),
            geocoding: GeocodingConfig::default(),
            store: StoreConfig::default(),
            progress: ProgressConfig::default(),
            notifier: None,
            refresh: RefreshConfig::default(),
            schedule: ScheduleConfig::default(),
            utc_offset_hours: -3,
            debug: None,
        }
    }
}

// ------------------------------------------------------------
// Pricing API
// ------------------------------------------------------------
//
// The upstream enforces a fixed request pace, so `throttle_ms` is a
// minimum interval between any two requests, retries included.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PricingConfig {
    /// Lookup endpoint
    pub url: String,

    /// Search radius in kilometres
    pub radius_km: u32,

    /// Minimum delay between two requests
    pub throttle_ms: u64,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Consecutive transient failures that trip the circuit breaker
    pub error_threshold: u32,

    /// Attempts per unit before the batch stops in front of it
    pub max_attempts: u32,

    /// Base delay before retrying the same unit
    pub retry_delay_ms: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            url: "https://menorpreco.notaparana.pr.gov.br/api/v1/produtos".into(),
            radius_km: 20,
            throttle_ms: 300,
            timeout_secs: 20,
            error_threshold: 5,
            max_attempts: 5,
            retry_delay_ms: 1_000,
        }
    }
}

// ------------------------------------------------------------
// Batching
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    /// Query units per run
    pub size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { size: 100 }
    }
}

// ------------------------------------------------------------
// Geocoding
// ------------------------------------------------------------
//
// The public geocoder allows one request per second and requires a
// client-identification header. `delay_ms` is the real limiter;
// `max_per_run` bounds the worst-case run time.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeocodingConfig {
    pub url: String,

    /// Sent as `User-Agent`; mandatory for the public service
    pub user_agent: String,

    pub delay_ms: u64,
    pub max_per_run: usize,
    pub timeout_secs: u64,

    /// Appended to addresses that do not mention them
    pub region: String,
    pub country: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            url: "https://nominatim.openstreetmap.org/search".into(),
            user_agent: "mp-feeder/2.0".into(),
            delay_ms: 1_100,
            max_per_run: 100,
            timeout_secs: 20,
            region: "PR".into(),
            country: "BRASIL".into(),
        }
    }
}

// ------------------------------------------------------------
// Primary store
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// sqlx connection URL, e.g. "sqlite://data/mp_feeder.db"
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/mp_feeder.db".into(),
            max_connections: 5,
        }
    }
}

// ------------------------------------------------------------
// Progress store (cursor + recovery snapshot)
// ------------------------------------------------------------
//
// Must live on a different server from the primary store: staging
// has to work while the primary store is down.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProgressConfig {
    pub redis_url: String,

    /// Namespace for the cursor and snapshot keys
    pub key_prefix: String,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1/".into(),
            key_prefix: "mp_feeder".into(),
        }
    }
}

// ------------------------------------------------------------
// Operator notification
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    /// Messaging endpoint, e.g. "https://api.telegram.org/bot<TOKEN>/sendMessage"
    pub url: String,

    /// Destination chat
    pub chat_id: String,

    /// Log messages instead of sending them
    #[serde(default)]
    pub demo: bool,
}

// ------------------------------------------------------------
// Product list refresh
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    /// Age after which the product ranking should be rebuilt
    pub max_age_days: i64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { max_age_days: 30 }
    }
}

// ------------------------------------------------------------
// Process loop
// ------------------------------------------------------------
//
// After a partial (circuit-broken) run the process waits and tries
// the same batch again, up to `max_resumes` times.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub max_resumes: u32,
    pub resume_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            max_resumes: 3,
            resume_delay_secs: 60,
        }
    }
}

// ------------------------------------------------------------
// Debug configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Log every pricing request, not only failures and summaries
    pub log: Option<bool>,
}
