use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown media kind: {0}")]
    UnknownMediaKind(String),

    #[error("unknown media source: {0}")]
    UnknownMediaSource(String),

    #[error("unknown system category: {0}")]
    UnknownCategory(String),

    #[error("not an inline data reference")]
    NotInline,

    #[error("malformed inline data reference: {0}")]
    MalformedInline(String),
}
