//! Project/shared partitioning of the Atelier media catalog.
//!
//! The catalog is persisted as two disjoint partitions:
//!
//! - the **project partition**: non-system folders and media items scoped to
//!   one project, stored in the project namespace keyed by project id;
//! - the **shared partition**: system folders, user-created unscoped folders,
//!   and unscoped media items, stored under a single key in the shared
//!   namespace.
//!
//! [`split`] is the only writer of both partitions, which keeps them
//! disjoint by id; [`merge`] recombines them (shared first) on load.
//! Persisted data is read back through [`reconcile_partition`], a per-field
//! field-by-field merge that tolerates legacy and malformed records.

pub mod error;
pub mod partition;
pub mod reconcile;
pub mod record;
pub mod store;

pub use error::{PartitionError, PartitionResult};
pub use partition::{merge, project_partition, shared_partition, split, Partitions};
pub use reconcile::{reconcile_folder, reconcile_media_item, reconcile_partition};
pub use record::{PersistedMediaItem, PersistedPartition, PARTITION_VERSION};
pub use store::{PartitionedStore, SHARED_KEY};
