use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use atelier_catalog::{
    BlobUrlRegistry, CatalogServices, KeyedMediaFileStore, LocalSaver, MediaFileStore,
    StoredMediaFile, TransientRefs,
};
use atelier_partition::PartitionedStore;
use atelier_rehydrate::{Rehydrated, Rehydrator};
use atelier_store::{KeyedStore, MemoryBackend, NamespaceAdmin, NamespaceDeletion, SqliteBackend};
use atelier_types::ProjectId;

use crate::config::AtelierConfig;
use crate::error::SdkResult;
use crate::saver::FsLocalSaver;

/// Store namespaces derived from a collection name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespaces {
    pub project: String,
    pub shared: String,
    pub files: String,
}

impl Namespaces {
    pub fn for_collection(collection: &str) -> Self {
        Self {
            project: format!("{collection}:project"),
            shared: format!("{collection}:shared"),
            files: format!("{collection}:files"),
        }
    }

    fn all(&self) -> [&str; 3] {
        [self.project.as_str(), self.shared.as_str(), self.files.as_str()]
    }
}

enum Storage {
    Sqlite(SqliteBackend),
    Memory(MemoryBackend),
}

impl Storage {
    fn namespace<T: atelier_store::StoreValue>(&self, name: &str) -> Arc<dyn KeyedStore<T>> {
        match self {
            Self::Sqlite(backend) => Arc::new(backend.namespace::<T>(name)),
            Self::Memory(backend) => Arc::new(backend.namespace::<T>(name)),
        }
    }

    fn admin(&self) -> &dyn NamespaceAdmin {
        match self {
            Self::Sqlite(backend) => backend as &dyn NamespaceAdmin,
            Self::Memory(backend) => backend as &dyn NamespaceAdmin,
        }
    }
}

/// Handles onto one generation of namespaces.
struct Wiring {
    partitions: PartitionedStore,
    files: Arc<KeyedMediaFileStore>,
    rehydrator: Rehydrator,
}

impl Wiring {
    fn new(
        storage: &Storage,
        namespaces: &Namespaces,
        saver: Arc<dyn LocalSaver>,
        refs: Arc<dyn TransientRefs>,
    ) -> Self {
        let partitions = PartitionedStore::new(
            storage.namespace::<Value>(&namespaces.project),
            storage.namespace::<Value>(&namespaces.shared),
        );
        let files = Arc::new(KeyedMediaFileStore::new(
            storage.namespace::<StoredMediaFile>(&namespaces.files),
        ));
        let services = CatalogServices::ephemeral(saver)
            .with_refs(refs)
            .with_files(Arc::clone(&files) as Arc<dyn MediaFileStore>);
        Self {
            rehydrator: Rehydrator::new(partitions.clone(), services),
            partitions,
            files,
        }
    }
}

/// An embedded media catalog: storage, collaborators, and startup.
pub struct Atelier {
    config: AtelierConfig,
    namespaces: Namespaces,
    storage: Storage,
    saver: Arc<dyn LocalSaver>,
    refs: Arc<dyn TransientRefs>,
    wiring: Wiring,
}

impl Atelier {
    /// Wire storage for `config`. With `persist_catalog` off, everything
    /// lives in memory for the life of the process.
    pub fn open(
        config: AtelierConfig,
        saver: Arc<dyn LocalSaver>,
        refs: Arc<dyn TransientRefs>,
    ) -> SdkResult<Self> {
        let storage = if config.persist_catalog {
            std::fs::create_dir_all(&config.data_dir)?;
            Storage::Sqlite(SqliteBackend::new(config.database_path()))
        } else {
            Storage::Memory(MemoryBackend::new())
        };
        let namespaces = Namespaces::for_collection(&config.collection);
        let wiring = Wiring::new(&storage, &namespaces, Arc::clone(&saver), Arc::clone(&refs));

        info!(
            collection = %config.collection,
            persistent = config.persist_catalog,
            "atelier opened"
        );
        Ok(Self {
            config,
            namespaces,
            storage,
            saver,
            refs,
            wiring,
        })
    }

    /// [`open`](Self::open) with a [`FsLocalSaver`] under the configured
    /// assets directory and an in-process reference registry.
    pub fn open_desktop(config: AtelierConfig) -> SdkResult<Self> {
        let saver = Arc::new(FsLocalSaver::new(config.assets_path()));
        Self::open(config, saver, Arc::new(BlobUrlRegistry::new()))
    }

    pub fn config(&self) -> &AtelierConfig {
        &self.config
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Rebuild the catalog for `project` and start the migration scan.
    pub async fn rehydrate(&self, project: Option<&ProjectId>) -> Rehydrated {
        self.wiring.rehydrator.rehydrate(project).await
    }

    /// Remove the stored partition and media records of `project`.
    /// Returns the number of media records deleted.
    pub async fn delete_project(&self, project: &ProjectId) -> SdkResult<usize> {
        self.wiring.partitions.remove_project(project).await?;
        let stored = self.wiring.files.load(Some(project)).await?;
        for file in &stored {
            self.wiring.files.delete(Some(project), &file.item.id).await?;
        }
        info!(project = %project, media = stored.len(), "project deleted");
        Ok(stored.len())
    }

    /// Drop every namespace of the collection and reopen fresh handles.
    /// A deletion the engine defers still counts as done.
    ///
    /// Catalogs rehydrated before the reset keep writing to the old
    /// handles; rehydrate again afterwards.
    pub async fn reset(&mut self) -> SdkResult<()> {
        for name in self.namespaces.all() {
            match self.storage.admin().delete_namespace(name).await? {
                NamespaceDeletion::Deleted => info!(namespace = name, "namespace deleted"),
                NamespaceDeletion::Pending => {
                    warn!(namespace = name, "namespace deletion deferred by open connections")
                }
            }
        }
        self.wiring = Wiring::new(
            &self.storage,
            &self.namespaces,
            Arc::clone(&self.saver),
            Arc::clone(&self.refs),
        );
        Ok(())
    }
}

impl std::fmt::Debug for Atelier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atelier")
            .field("collection", &self.config.collection)
            .field("persistent", &self.config.persist_catalog)
            .field("namespaces", &self.namespaces)
            .finish()
    }
}
