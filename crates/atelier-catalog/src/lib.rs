//! # atelier-catalog
//!
//! The catalog state container for Atelier.
//!
//! [`CatalogState`] is the pure state machine over folders, media items,
//! and selection. [`MediaCatalog`] wraps it for concurrent use and adds
//! background persistence through a [`PartitionedStore`] snapshot writer
//! and a per-item [`MediaFileStore`].
//!
//! External capabilities are traits:
//!
//! - [`LocalSaver`] moves inline or remote assets into durable storage.
//! - [`MediaProbe`] reads dimensions, durations, and video thumbnails.
//! - [`TransientRefs`] owns in-process references to binary data.
//!
//! [`PartitionedStore`]: atelier_partition::PartitionedStore

pub mod catalog;
pub mod error;
pub mod files;
pub mod payload;
pub mod probe;
pub mod refs;
pub mod saver;
pub mod state;

pub use catalog::{
    CatalogServices, MaterializeOutcome, MaterializeScope, MediaCatalog, NewMediaFile,
    NewMediaUrl,
};
pub use error::{CatalogError, CatalogResult, ProbeError, SaveError};
pub use files::{
    ItemPayloads, KeyedMediaFileStore, LoadedMediaFile, MediaFileStore, StoredMediaFile,
    StoredPayload, SHARED_SCOPE,
};
pub use payload::MediaPayload;
pub use probe::{probe_media, thumbnail_sample_time, Dimensions, MediaProbe, ProbeReport, VideoFrame};
pub use refs::{BlobUrlRegistry, TransientRefs};
pub use saver::{migrated_reference, LocalSaver, PassthroughSaver};
pub use state::{CatalogState, FolderDeletion, SystemFolderReport};
