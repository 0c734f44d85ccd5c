use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt store row: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug)]
pub enum ExecError {
    /// Ledger precondition failed; no order was submitted.
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    /// The brokerage rejected the order or the submission timed out.
    /// Never retried blindly; surfaced as a failed trade record.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Persistence failed after the brokerage side effect happened. The
    /// in-memory ledger already reflects the execution; the write must be
    /// retried independently of the trading logic.
    #[error("store write failed after execution of decision {decision_id}: {source}")]
    StoreWriteFailed {
        decision_id: Uuid,
        source: StoreError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),
}
