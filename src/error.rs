//! Error taxonomy
//!
//! - `ApiError`:      one failed pricing lookup (classified by the retry policy)
//! - `FatalApiError`: the pricing contract itself is broken, abort the run
//! - `StoreError`:    a durable store call failed (connectivity vs integrity)
//! - `RunError`:      batch-level failure surfaced to the process loop
//!
//! Per-unit failures never leave the collection engine; only
//! `FatalApiError` does.

use thiserror::Error;

use crate::schema::UnitKey;

/// Failure of a single pricing lookup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    #[error("upstream answered with status {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("undecodable response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Contract-breaking response from the pricing API (401/403/404 class).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("pricing API contract failure: status {status} while querying {unit}")]
pub struct FatalApiError {
    pub status: u16,
    pub unit: UnitKey,
}

/// Failure of a durable store call.
///
/// The split decides what the run controller does next:
/// connectivity failures are staged for recovery, integrity failures
/// are surfaced and never staged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Connectivity(String),

    #[error("store rejected data: {0}")]
    Integrity(String),
}

impl StoreError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Connectivity(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Connectivity(e.to_string()),
            other => StoreError::Integrity(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Connectivity(e.to_string())
    }
}

/// Batch-level outcome that ends a run without success.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    FatalApi(#[from] FatalApiError),

    #[error("primary store unreachable during commit (results staged: {staged}): {source}")]
    StorageConnectivity {
        #[source]
        source: StoreError,
        staged: bool,
    },

    #[error("primary store rejected the batch: {0}")]
    StorageIntegrity(#[source] StoreError),

    #[error("progress store failure: {0}")]
    Progress(#[source] StoreError),
}

impl RunError {
    /// Wraps a gateway failure that happened outside a commit
    /// (reading keys, known vendors, refresh timestamps).
    pub fn from_gateway(e: StoreError) -> Self {
        match e {
            StoreError::Connectivity(_) => RunError::StorageConnectivity {
                source: e,
                staged: false,
            },
            StoreError::Integrity(_) => RunError::StorageIntegrity(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_are_connectivity_failures() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_connectivity());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_connectivity());
    }

    #[test]
    fn row_level_failures_are_integrity_failures() {
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_connectivity());
    }

    #[test]
    fn gateway_errors_keep_their_class() {
        let err = RunError::from_gateway(StoreError::Integrity("bad".into()));
        assert!(matches!(err, RunError::StorageIntegrity(_)));

        let err = RunError::from_gateway(StoreError::Connectivity("down".into()));
        assert!(matches!(err, RunError::StorageConnectivity { staged: false, .. }));
    }
}
