//! # atelier-sdk
//!
//! Embedding facade for the Atelier media catalog.
//!
//! [`Atelier`] turns an [`AtelierConfig`] into a wired catalog: SQLite
//! namespaces for the project, shared, and media file stores, a local
//! saver, and a [`Rehydrator`](atelier_rehydrate::Rehydrator) for startup.
//! Applications install their own `tracing` subscriber.

pub mod atelier;
pub mod config;
pub mod error;
pub mod saver;

pub use atelier::{Atelier, Namespaces};
pub use config::AtelierConfig;
pub use error::{SdkError, SdkResult};
pub use saver::FsLocalSaver;

pub use atelier_catalog::{
    BlobUrlRegistry, CatalogServices, LocalSaver, MediaCatalog, MediaProbe, NewMediaFile,
    NewMediaUrl, TransientRefs,
};
pub use atelier_rehydrate::{MigrationReport, MigrationScan, Rehydrated};
pub use atelier_types::{
    Folder, FolderId, MediaId, MediaItem, MediaKind, MediaSource, ProjectId, SystemCategory,
};
