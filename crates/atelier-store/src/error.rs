/// Errors from keyed store operations.
///
/// Transport failures are always propagated to the caller; this layer never
/// swallows them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Opening the underlying database failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The transaction failed or was rolled back.
    #[error("transaction failed in {namespace}: {reason}")]
    Transaction { namespace: String, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend refused the operation (closed or fault-injected).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The blocking worker running the transaction panicked or was cancelled.
    #[error("storage task failed: {0}")]
    TaskJoin(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
