use std::time::Duration;

use rand::random_range;

use crate::{config::PricingConfig, error::ApiError};

/// What the engine does with a failed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transient: counts towards the circuit breaker, unit is retried
    Retry,
    /// Item-level rejection: log it and move on
    Skip,
    /// The API contract is broken: abort the run
    Fatal,
}

/// Default classifier for the pricing API.
///
/// - 401 / 403 / 404 → fatal (credentials or endpoint are wrong)
/// - other 4xx       → skip the unit
/// - everything else → transient
pub fn classify_pricing_error(error: &ApiError) -> Disposition {
    match error {
        ApiError::Status(401 | 403 | 404) => Disposition::Fatal,
        ApiError::Status(s) if (400..500).contains(s) => Disposition::Skip,
        _ => Disposition::Retry,
    }
}

/// Retry policy: (max attempts, delay, classifier).
///
/// Attempts are counted per unit. The delay grows linearly with the
/// attempt number and carries up to 25% random jitter.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    classifier: fn(&ApiError) -> Disposition,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        delay: Duration,
        classifier: fn(&ApiError) -> Disposition,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            classifier,
        }
    }

    pub fn from_config(cfg: &PricingConfig) -> Self {
        Self::new(
            cfg.max_attempts,
            Duration::from_millis(cfg.retry_delay_ms),
            classify_pricing_error,
        )
    }

    pub fn classify(&self, error: &ApiError) -> Disposition {
        (self.classifier)(error)
    }

    /// True while `attempt` (1-based, already made) leaves room for another.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Wait before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.delay.saturating_mul(attempt.max(1));
        let spread = (base.as_millis() / 4) as u64;
        if spread == 0 {
            return base;
        }
        base + Duration::from_millis(random_range(0..=spread))
    }
}

/// Counts consecutive transient failures across units.
///
/// Any success resets it; reaching the threshold trips it.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Records one failure; returns true when the breaker trips.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.threshold
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// No failure since the last success.
    pub fn is_clean(&self) -> bool {
        self.consecutive == 0
    }
}
