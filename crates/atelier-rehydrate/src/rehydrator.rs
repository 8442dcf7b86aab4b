use tracing::{debug, info};

use atelier_catalog::{CatalogServices, CatalogState, MediaCatalog, SystemFolderReport};
use atelier_partition::PartitionedStore;
use atelier_types::ProjectId;

use crate::migration::MigrationScan;

/// Result of [`Rehydrator::rehydrate`].
#[derive(Debug)]
pub struct Rehydrated {
    pub catalog: MediaCatalog,
    /// The background migration scan. Startup does not wait for it.
    pub scan: MigrationScan,
    pub system_folders: SystemFolderReport,
    /// Items moved to the root because their folder was missing.
    pub repaired: usize,
    /// Items restored from the media file store.
    pub restored: usize,
}

/// Rebuilds a [`MediaCatalog`] from persisted partitions at startup.
#[derive(Clone, Debug)]
pub struct Rehydrator {
    partitions: PartitionedStore,
    services: CatalogServices,
}

impl Rehydrator {
    /// The catalogs produced write their snapshots back to `partitions`.
    pub fn new(partitions: PartitionedStore, services: CatalogServices) -> Self {
        Self {
            services: services.with_partitions(partitions.clone()),
            partitions,
        }
    }

    /// Load and merge the partitions for `project`, repair and initialize
    /// the catalog, restore stored media, then start the migration scan.
    ///
    /// Unreadable or malformed partitions never fail startup; they are
    /// logged and read as empty or reconciled.
    pub async fn rehydrate(&self, project: Option<&ProjectId>) -> Rehydrated {
        let loaded = self.partitions.load_resilient(project).await;
        info!(
            project = ?project,
            folders = loaded.folders.len(),
            media = loaded.media_files.len(),
            "catalog partitions loaded"
        );

        let catalog = MediaCatalog::with_state(
            CatalogState::new(loaded),
            project.cloned(),
            self.services.clone(),
        );
        let repaired = catalog.repair_dangling_folder_refs();
        let system_folders = catalog.init_system_folders();
        let restored = match project {
            Some(p) => catalog.load_project_media(p).await,
            None => catalog.load_shared_media().await,
        };
        let inline = catalog.persist_inline_payloads();
        debug!(inline, "inline payloads queued for storage");

        let scan = MigrationScan::spawn(catalog.clone());
        Rehydrated {
            catalog,
            scan,
            system_folders,
            repaired,
            restored,
        }
    }
}
