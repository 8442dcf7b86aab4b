use atelier_store::StoreError;

/// Errors from partition persistence.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// The underlying keyed store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A partition could not be encoded for writing.
    #[error("failed to encode partition: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result alias for partition operations.
pub type PartitionResult<T> = Result<T, PartitionError>;
