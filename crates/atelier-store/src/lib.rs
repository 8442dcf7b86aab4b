//! Keyed object storage for the Atelier media catalog.
//!
//! A keyed store persists serializable values of one entity type under
//! string keys inside a named *namespace*. The catalog uses one namespace
//! per logical partition (project-scoped, shared, media payloads).
//!
//! # Storage Backends
//!
//! All namespace handles implement the [`KeyedStore`] trait, and every
//! backend implements [`NamespaceAdmin`]:
//!
//! - [`MemoryBackend`] / [`InMemoryKeyedStore`] -- shared in-process maps for
//!   tests and embedding, with failure injection
//! - [`SqliteBackend`] / [`SqliteKeyedStore`] -- one SQLite table per
//!   namespace, one connection and one transaction per call
//!
//! # Design Rules
//!
//! 1. Each call performs exactly one atomic transaction; no call observes a
//!    partially applied transaction from another.
//! 2. Setup (table creation) is memoized per handle; concurrent first callers
//!    await the same setup.
//! 3. Transport errors are propagated, never silently ignored.
//! 4. Namespace deletion may be deferred; [`NamespaceDeletion::Pending`] is
//!    success.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryKeyedStore, MemoryBackend};
pub use sqlite::{SqliteBackend, SqliteKeyedStore};
pub use traits::{KeyedStore, NamespaceAdmin, NamespaceDeletion, StoreValue};
