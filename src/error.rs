// src/error.rs
// Typed failure taxonomy. Batch-level and item-level failures carry distinct
// types so the scheduler and pipeline can apply distinct policies.

use thiserror::Error;

/// Failure of a connector fetch. The variant decides the scheduler's policy:
/// transient errors back off and retry, fatal errors stop the loop.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network trouble, rate limiting, upstream 5xx, timeout. Retryable; the
    /// cursor is left untouched so the next run re-fetches the same window.
    #[error("transient source failure: {0}")]
    Transient(anyhow::Error),

    /// Authentication failure or a response shape the connector cannot
    /// parse. The connector is disabled until an operator intervenes.
    #[error("fatal source failure: {0}")]
    Fatal(anyhow::Error),
}

impl FetchError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        FetchError::Transient(err.into())
    }

    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        FetchError::Fatal(err.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Fatal(_))
    }
}

/// Per-item classification failure (model error or timeout). The item is
/// stored with `SentimentLabel::Unknown` and the batch continues.
#[derive(Debug, Error)]
#[error("classification failed: {0}")]
pub struct ClassifyError(pub anyhow::Error);

impl ClassifyError {
    pub fn msg(m: impl Into<String>) -> Self {
        ClassifyError(anyhow::anyhow!(m.into()))
    }
}

impl From<anyhow::Error> for ClassifyError {
    fn from(err: anyhow::Error) -> Self {
        ClassifyError(err)
    }
}

/// Unexpected storage write failure. Item-isolated, but it marks the batch
/// dirty: the cursor is not advanced, and the idempotent store absorbs the
/// replay on the next run.
#[derive(Debug, Error)]
#[error("persistence failure: {0}")]
pub struct PersistenceError(pub anyhow::Error);

impl PersistenceError {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        PersistenceError(err.into())
    }
}
