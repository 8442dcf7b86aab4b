//! Foundation types for the Atelier media catalog.
//!
//! This crate provides the data model shared by every other Atelier crate:
//! identifiers, media items, folders, and the classification of the URL-like
//! references that point at asset bytes.
//!
//! # Key Types
//!
//! - [`MediaItem`] -- a single image, video, or audio asset
//! - [`Folder`] -- a node in the folder forest, optionally a system folder
//! - [`Catalog`] -- the combined, append-ordered set of folders and items
//! - [`SystemCategory`] -- the fixed categories that own a system folder
//! - [`MediaRef`] -- transient / inline / durable / remote reference classes
//! - [`MediaId`], [`FolderId`], [`ProjectId`] -- string identifiers

pub mod catalog;
pub mod error;
pub mod folder;
pub mod identity;
pub mod media;
pub mod reference;

pub use catalog::Catalog;
pub use error::TypeError;
pub use folder::{Folder, SystemCategory, LEGACY_AI_FOLDER_NAME};
pub use identity::{FolderId, MediaId, ProjectId};
pub use media::{MediaItem, MediaKind, MediaSource};
pub use reference::{extension_for_mime, InlineData, MediaRef, DURABLE_PREFIX};

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
