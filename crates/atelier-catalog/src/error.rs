use atelier_partition::PartitionError;
use atelier_store::StoreError;
use atelier_types::TypeError;

/// Failure reported by the local-save collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// The source could not be fetched or decoded.
    #[error("cannot read source: {0}")]
    Source(String),

    /// Writing to local storage failed.
    #[error("local write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The saver is not able to accept this source right now.
    #[error("local save unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a media probe. Probes never return partial output.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("cannot decode {kind} media: {reason}")]
    Decode { kind: &'static str, reason: String },

    #[error("probe unsupported for {0}")]
    Unsupported(&'static str),
}

/// Errors surfaced by catalog persistence and collaborator calls.
///
/// In-memory mutations never produce these; only the asynchronous side
/// does, and the container logs rather than surfaces them.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("local save failed: {0}")]
    Save(#[from] SaveError),

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("invalid reference: {0}")]
    Reference(#[from] TypeError),

    #[error("payload encoding error: {0}")]
    Payload(String),
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
