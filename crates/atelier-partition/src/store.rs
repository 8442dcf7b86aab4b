use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use atelier_store::KeyedStore;
use atelier_types::{Catalog, ProjectId};

use crate::error::PartitionResult;
use crate::partition::{merge, shared_partition, split};
use crate::reconcile::reconcile_partition;
use crate::record::PersistedPartition;

/// Key of the single record in the shared namespace.
pub const SHARED_KEY: &str = "shared";

/// Persists a catalog as a project partition plus a shared partition.
///
/// Values are stored as raw JSON so that reads can go through
/// [`reconcile_partition`] instead of strict deserialization.
#[derive(Clone)]
pub struct PartitionedStore {
    project: Arc<dyn KeyedStore<Value>>,
    shared: Arc<dyn KeyedStore<Value>>,
}

impl PartitionedStore {
    pub fn new(project: Arc<dyn KeyedStore<Value>>, shared: Arc<dyn KeyedStore<Value>>) -> Self {
        Self { project, shared }
    }

    /// Write `catalog` split around `project`. Without an active project only
    /// the shared partition is written.
    pub async fn save(&self, catalog: &Catalog, project: Option<&ProjectId>) -> PartitionResult<()> {
        let (shared, scoped) = match project {
            Some(p) => {
                let parts = split(catalog, p);
                (parts.shared, Some((p, parts.project)))
            }
            None => (shared_partition(catalog), None),
        };

        let shared_value = serde_json::to_value(PersistedPartition::from_catalog(&shared))?;
        self.shared.set(SHARED_KEY, &shared_value).await?;

        if let Some((p, partition)) = scoped {
            let value = serde_json::to_value(PersistedPartition::from_catalog(&partition))?;
            self.project.set(p.as_str(), &value).await?;
            debug!(
                project = %p,
                folders = partition.folders.len(),
                media = partition.media_files.len(),
                "project partition written"
            );
        }
        debug!(
            folders = shared.folders.len(),
            media = shared.media_files.len(),
            "shared partition written"
        );
        Ok(())
    }

    /// Read both partitions and merge them, shared first.
    ///
    /// Transport failures are returned; malformed content is reconciled.
    pub async fn load(&self, project: Option<&ProjectId>) -> PartitionResult<Catalog> {
        let shared = match self.shared.get(SHARED_KEY).await? {
            Some(value) => reconcile_partition(&value),
            None => Catalog::default(),
        };
        let scoped = match project {
            Some(p) => match self.project.get(p.as_str()).await? {
                Some(value) => reconcile_partition(&value),
                None => Catalog::default(),
            },
            None => Catalog::default(),
        };
        Ok(merge(&scoped, &shared))
    }

    /// Like [`load`](Self::load), but a partition that cannot be read is
    /// logged and treated as empty so startup never fails.
    pub async fn load_resilient(&self, project: Option<&ProjectId>) -> Catalog {
        let shared = self
            .read_or_empty(&*self.shared, SHARED_KEY)
            .await;
        let scoped = match project {
            Some(p) => self.read_or_empty(&*self.project, p.as_str()).await,
            None => Catalog::default(),
        };
        merge(&scoped, &shared)
    }

    /// Drop the stored partition of one project.
    pub async fn remove_project(&self, project: &ProjectId) -> PartitionResult<()> {
        self.project.remove(project.as_str()).await?;
        Ok(())
    }

    async fn read_or_empty(&self, store: &dyn KeyedStore<Value>, key: &str) -> Catalog {
        match store.get(key).await {
            Ok(Some(value)) => reconcile_partition(&value),
            Ok(None) => Catalog::default(),
            Err(e) => {
                warn!(namespace = store.namespace(), key, error = %e, "partition unreadable; starting empty");
                Catalog::default()
            }
        }
    }
}

impl std::fmt::Debug for PartitionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedStore")
            .field("project", &self.project.namespace())
            .field("shared", &self.shared.namespace())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_store::MemoryBackend;
    use atelier_types::{Folder, FolderId, MediaId, MediaItem, MediaKind, MediaSource, SystemCategory};

    fn store(backend: &MemoryBackend) -> PartitionedStore {
        PartitionedStore::new(
            Arc::new(backend.namespace::<Value>("library:project")),
            Arc::new(backend.namespace::<Value>("library:shared")),
        )
    }

    fn item(id: &str, project: Option<&str>, url: &str) -> MediaItem {
        MediaItem {
            id: MediaId::new(id),
            name: id.into(),
            kind: MediaKind::Image,
            url: url.into(),
            thumbnail_url: None,
            duration: None,
            width: None,
            height: None,
            folder_id: None,
            project_id: project.map(ProjectId::new),
            source: MediaSource::Upload,
            ephemeral: false,
        }
    }

    fn sample() -> Catalog {
        let mut scoped = Folder::user("Scratch", None, Some(ProjectId::new("p1")));
        scoped.id = FolderId::new("scoped");
        let mut shared = Folder::user("Shared", None, None);
        shared.id = FolderId::new("shared");
        Catalog::new(
            vec![Folder::system(SystemCategory::Upload), scoped, shared],
            vec![
                item("a", Some("p1"), "atelier-local://upload/a.png"),
                item("b", None, "https://cdn.example/b.png"),
            ],
        )
    }

    #[tokio::test]
    async fn save_then_load_restores_catalog() {
        let backend = MemoryBackend::new();
        let store = store(&backend);
        let p = ProjectId::new("p1");
        store.save(&sample(), Some(&p)).await.unwrap();

        let loaded = store.load(Some(&p)).await.unwrap();
        assert_eq!(loaded.folders.len(), 3);
        let ids: Vec<_> = loaded.media_files.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn load_without_project_sees_only_shared() {
        let backend = MemoryBackend::new();
        let store = store(&backend);
        store.save(&sample(), Some(&ProjectId::new("p1"))).await.unwrap();

        let loaded = store.load(None).await.unwrap();
        assert_eq!(loaded.folders.len(), 2);
        assert_eq!(loaded.media_files.len(), 1);
    }

    #[tokio::test]
    async fn save_without_project_writes_shared_only() {
        let backend = MemoryBackend::new();
        let store = store(&backend);
        store.save(&sample(), None).await.unwrap();
        assert_eq!(backend.namespace_names(), vec!["library:shared"]);
    }

    #[tokio::test]
    async fn projects_are_stored_independently() {
        let backend = MemoryBackend::new();
        let store = store(&backend);
        let p1 = ProjectId::new("p1");
        let p2 = ProjectId::new("p2");
        store.save(&sample(), Some(&p1)).await.unwrap();

        let other = Catalog::new(vec![], vec![item("c", Some("p2"), "https://cdn.example/c.png")]);
        store.save(&other, Some(&p2)).await.unwrap();

        let loaded = store.load(Some(&p1)).await.unwrap();
        assert!(loaded.media(&MediaId::new("a")).is_some());
        assert!(loaded.media(&MediaId::new("c")).is_none());

        store.remove_project(&p1).await.unwrap();
        let loaded = store.load(Some(&p1)).await.unwrap();
        assert!(loaded.media(&MediaId::new("a")).is_none());
    }

    #[tokio::test]
    async fn transient_urls_are_not_written() {
        let backend = MemoryBackend::new();
        let store = store(&backend);
        let catalog = Catalog::new(vec![], vec![item("t", None, "blob:atelier/xyz")]);
        store.save(&catalog, None).await.unwrap();

        let raw = backend.get_raw("library:shared", SHARED_KEY).unwrap().unwrap();
        assert!(!raw.contains("blob:"));
    }

    #[tokio::test]
    async fn malformed_data_is_reconciled() {
        let backend = MemoryBackend::new();
        backend
            .put_raw(
                "library:shared",
                SHARED_KEY,
                r#"{"folders":[{"id":"x","name":"Legacy","extra":true},{"bogus":1}],"mediaFiles":"oops"}"#,
            )
            .unwrap();
        let loaded = store(&backend).load(None).await.unwrap();
        assert_eq!(loaded.folders.len(), 1);
        assert!(loaded.media_files.is_empty());
    }

    #[tokio::test]
    async fn transport_failures_surface_from_load_but_not_resilient_load() {
        let backend = MemoryBackend::new();
        let store = store(&backend);
        store.save(&sample(), None).await.unwrap();
        backend.set_failing(true);

        assert!(store.load(None).await.is_err());
        assert!(store.load_resilient(None).await.is_empty());
        assert!(store.save(&sample(), None).await.is_err());
    }
}
