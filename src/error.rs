//! Error taxonomy for the engine.
//!
//! Callers that need to branch on failure kind (the Registry's callers, the
//! Dispatcher's internal control flow) match on [`EngineError`]. Glue code
//! that only needs to propagate a cause up to a log line (config loading,
//! store bootstrap) keeps using `anyhow::Result`, same as the teacher does.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: tenant does not own this record")]
    Forbidden,

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("store busy: could not acquire lock on {path} within {timeout_secs}s")]
    StoreBusy { path: String, timeout_secs: u64 },

    #[error("store corrupt: {path}: {reason}")]
    StoreCorrupt { path: String, reason: String },

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("broker rejected order: {0}")]
    BrokerRejected(String),

    #[error("quote unavailable for {0}")]
    QuoteUnavailable(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
