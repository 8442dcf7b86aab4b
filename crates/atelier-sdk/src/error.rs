use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] atelier_store::StoreError),

    #[error("partition error: {0}")]
    Partition(#[from] atelier_partition::PartitionError),

    #[error("catalog error: {0}")]
    Catalog(#[from] atelier_catalog::CatalogError),

    #[error("not a durable reference: {0}")]
    NotDurable(String),
}

pub type SdkResult<T> = Result<T, SdkError>;
