//! Error taxonomy for the pipeline.
//!
//! Each variant maps to one row of the error taxonomy: transient exchange
//! failures are retried by the caller with bounded backoff, data gaps and
//! contract violations suppress a signal without being a caller-visible
//! error, broker/persistence races are "someone else won", and fatal errors
//! terminate the process so the orchestrator can restart it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rate-limit, 5xx, or socket timeout talking to the exchange. Retried
    /// within the current operation; if retries are exhausted the caller
    /// treats the datum as missing and skips it.
    #[error("transient exchange error: {0}")]
    TransientExchange(String),

    /// Insufficient candles, empty MTF fibonacci, or any other missing
    /// input. Not an error to the caller: the signal is suppressed.
    #[error("data gap: {0}")]
    DataGap(String),

    /// Invariant I1-I3 failed after rounding. The signal is suppressed and
    /// logged at warning.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Broker connection reset mid-consume. The message is nack-requeued
    /// and the service reconnects.
    #[error("broker delivery error: {0}")]
    BrokerDelivery(String),

    /// A conditional persistence update failed because the row's status
    /// already changed. Treated as "someone else won", not an error.
    #[error("persistence conflict: {0}")]
    PersistenceConflict(String),

    /// Misconfiguration or a missing secret. The process exits non-zero.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Whether the failing operation should be retried with backoff before
    /// giving up for this cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::TransientExchange(_))
    }

    /// Whether a broker message that failed this way should be nack'd with
    /// requeue rather than ack'd.
    pub fn should_requeue(&self) -> bool {
        matches!(self, PipelineError::BrokerDelivery(_))
    }
}
