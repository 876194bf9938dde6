// =============================================================================
// Error taxonomy — shared across all five schedulers
// =============================================================================
//
// Each scheduler's outer tick loop matches on these variants to decide
// whether to sleep-and-reconnect, skip-and-continue, or abort. See
// `store::Store` for where `StorageError` originates and `engine` for
// `DataInsufficient`.
// =============================================================================

use thiserror::Error;

/// Top-level error type returned by library operations.
///
/// `main()` in each binary only ever sees this wrapped in `anyhow::Error`;
/// the typed variants exist so the tick loops in `runner`, `watcher`, and
/// `co_occurrence` can match on failure kind instead of string-matching a
/// message.
#[derive(Debug, Error)]
pub enum PumpError {
    /// Transient database failure. Recovery: sleep 60s, reconnect, resume
    /// with the next tick.
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),

    /// A symbol has too few signals, a pair lacks enough baseline priors,
    /// or a required candle is missing. Recovery: skip silently.
    #[error("insufficient data: {0}")]
    DataInsufficient(String),

    /// A required configuration value is missing or mistyped at startup.
    /// Fatal.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Alert dispatch or exchange HTTP call failed. Recovery: log at warn,
    /// proceed — never blocks a database write.
    #[error("external dispatch failed: {0}")]
    ExternalDispatchFailed(String),

    /// Uniqueness conflict on insert. Expected path: treat as "already
    /// present".
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
}

/// Storage-layer failures surfaced by [`crate::store::Store`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database connection pool error: {0}")]
    Pool(String),
}

pub type Result<T> = std::result::Result<T, PumpError>;
