//! The catalog container: [`CatalogState`] plus background persistence.
//!
//! Mutations apply to the in-memory state synchronously and are visible to
//! the caller on return. Persistence runs in spawned tasks that the caller
//! never awaits; their failures are logged, not surfaced. A task that
//! finishes after its item was removed re-checks state and does nothing.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use atelier_partition::PartitionedStore;
use atelier_types::{
    extension_for_mime, Catalog, Folder, FolderId, MediaId, MediaItem, MediaKind, MediaRef,
    MediaSource, ProjectId, SystemCategory,
};

use crate::error::CatalogResult;
use crate::files::{ItemPayloads, LoadedMediaFile, MediaFileStore};
use crate::payload::MediaPayload;
use crate::probe::{probe_media, MediaProbe};
use crate::refs::{BlobUrlRegistry, TransientRefs};
use crate::saver::{migrated_reference, LocalSaver};
use crate::state::{CatalogState, SystemFolderReport};

/// Collaborators used by a [`MediaCatalog`].
#[derive(Clone)]
pub struct CatalogServices {
    /// Snapshot persistence. `None` keeps the catalog in memory only.
    pub partitions: Option<PartitionedStore>,
    /// Per-item record and payload persistence.
    pub files: Option<Arc<dyn MediaFileStore>>,
    pub saver: Arc<dyn LocalSaver>,
    pub refs: Arc<dyn TransientRefs>,
}

impl CatalogServices {
    /// Services with no persistence and a fresh [`BlobUrlRegistry`].
    pub fn ephemeral(saver: Arc<dyn LocalSaver>) -> Self {
        Self {
            partitions: None,
            files: None,
            saver,
            refs: Arc::new(BlobUrlRegistry::new()),
        }
    }

    pub fn with_partitions(mut self, partitions: PartitionedStore) -> Self {
        self.partitions = Some(partitions);
        self
    }

    pub fn with_files(mut self, files: Arc<dyn MediaFileStore>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn with_refs(mut self, refs: Arc<dyn TransientRefs>) -> Self {
        self.refs = refs;
        self
    }
}

impl std::fmt::Debug for CatalogServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogServices")
            .field("partitions", &self.partitions)
            .field("files", &self.files.is_some())
            .field("live_refs", &self.refs.live_count())
            .finish()
    }
}

/// A new item backed by in-memory bytes.
#[derive(Clone, Debug)]
pub struct NewMediaFile {
    pub name: String,
    pub kind: MediaKind,
    pub media: MediaPayload,
    pub thumbnail: Option<MediaPayload>,
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub folder_id: Option<FolderId>,
    pub source: MediaSource,
    pub ephemeral: bool,
}

impl NewMediaFile {
    pub fn new(name: impl Into<String>, kind: MediaKind, media: MediaPayload) -> Self {
        Self {
            name: name.into(),
            kind,
            media,
            thumbnail: None,
            duration: None,
            width: None,
            height: None,
            folder_id: None,
            source: MediaSource::Upload,
            ephemeral: false,
        }
    }

    pub fn in_folder(mut self, folder: FolderId) -> Self {
        self.folder_id = Some(folder);
        self
    }
}

/// A new item that points at an existing URL.
#[derive(Clone, Debug)]
pub struct NewMediaUrl {
    pub name: String,
    pub kind: MediaKind,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub folder_id: Option<FolderId>,
    pub project_id: Option<ProjectId>,
    pub source: MediaSource,
    pub ephemeral: bool,
}

impl NewMediaUrl {
    pub fn new(name: impl Into<String>, kind: MediaKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            url: url.into(),
            thumbnail_url: None,
            duration: None,
            width: None,
            height: None,
            folder_id: None,
            project_id: None,
            source: MediaSource::Upload,
            ephemeral: false,
        }
    }

    pub fn with_source(mut self, source: MediaSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_project(mut self, project: ProjectId) -> Self {
        self.project_id = Some(project);
        self
    }
}

/// Which references [`MediaCatalog::materialize_item`] rewrites.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterializeScope {
    /// Only inline (`data:`) references.
    Inline,
    /// Inline references and remote URLs.
    Fetchable,
}

impl MaterializeScope {
    fn accepts(self, reference: MediaRef) -> bool {
        match self {
            Self::Inline => reference.is_inline(),
            Self::Fetchable => reference.is_materializable(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// At least one reference now points at durable storage.
    Migrated,
    /// Nothing to do, or the saver left the source as is.
    Unchanged,
    /// The saver failed; the item keeps its prior reference.
    Failed,
    /// The item was removed before the save finished.
    Discarded,
}

struct Inner {
    state: RwLock<CatalogState>,
    project: RwLock<Option<ProjectId>>,
    services: CatalogServices,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Generation of the most recent snapshot handed to a writer.
    generation: AtomicU64,
    /// Generation of the most recent snapshot written.
    persisted: tokio::sync::Mutex<u64>,
    /// Serializes per-item file writes against deletes.
    file_io: tokio::sync::Mutex<()>,
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_project(&self) -> Option<ProjectId> {
        self.project
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn release_refs(&self, item: &MediaItem) {
        for url in item.transient_urls() {
            self.services.refs.release(url);
        }
    }

    /// Bytes behind the item's transient references, if still live.
    fn payloads_of(&self, item: &MediaItem) -> ItemPayloads {
        let resolve = |url: &str| {
            MediaRef::classify(url)
                .is_transient()
                .then(|| self.services.refs.resolve(url))
                .flatten()
        };
        ItemPayloads {
            media: resolve(&item.url),
            thumbnail: item.thumbnail_url.as_deref().and_then(resolve),
        }
    }
}

/// Resets `is_loading` when dropped, whatever path the load took.
struct LoadingGuard<'a>(&'a Inner);

impl<'a> LoadingGuard<'a> {
    fn begin(inner: &'a Inner) -> Self {
        inner.write().is_loading = true;
        Self(inner)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.write().is_loading = false;
    }
}

/// The authoritative media catalog.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MediaCatalog {
    inner: Arc<Inner>,
}

impl MediaCatalog {
    pub fn new(services: CatalogServices) -> Self {
        Self::with_state(CatalogState::default(), None, services)
    }

    pub fn with_state(
        state: CatalogState,
        project: Option<ProjectId>,
        services: CatalogServices,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(state),
                project: RwLock::new(project),
                services,
                tasks: Mutex::new(Vec::new()),
                generation: AtomicU64::new(0),
                persisted: tokio::sync::Mutex::new(0),
                file_io: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn services(&self) -> &CatalogServices {
        &self.inner.services
    }

    pub fn active_project(&self) -> Option<ProjectId> {
        self.inner.active_project()
    }

    /// Scope later snapshot writes to `project`.
    pub fn set_active_project(&self, project: Option<ProjectId>) {
        *self
            .inner
            .project
            .write()
            .unwrap_or_else(PoisonError::into_inner) = project;
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> CatalogState {
        self.inner.read().clone()
    }

    pub fn catalog(&self) -> Catalog {
        self.inner.read().catalog.clone()
    }

    pub fn media_item(&self, id: &MediaId) -> Option<MediaItem> {
        self.inner.read().media_item(id).cloned()
    }

    pub fn folder(&self, id: &FolderId) -> Option<Folder> {
        self.inner.read().folder(id).cloned()
    }

    pub fn media_in_folder(&self, folder: Option<&FolderId>) -> Vec<MediaItem> {
        self.inner
            .read()
            .media_in_folder(folder)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn child_folders(&self, parent: Option<&FolderId>) -> Vec<Folder> {
        self.inner
            .read()
            .child_folders(parent)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn folder_path(&self, id: &FolderId) -> Vec<Folder> {
        self.inner
            .read()
            .folder_path(id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn media_for_project(&self, project: &ProjectId) -> Vec<MediaItem> {
        self.inner
            .read()
            .media_for_project(project)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn category_folder(&self, category: SystemCategory) -> Option<Folder> {
        self.inner.read().category_folder(category).cloned()
    }

    pub fn current_folder_id(&self) -> Option<FolderId> {
        self.inner.read().current_folder_id.clone()
    }

    /// Selection is not persisted.
    pub fn set_current_folder(&self, id: Option<FolderId>) -> bool {
        self.inner.write().set_current_folder(id)
    }

    pub fn is_loading(&self) -> bool {
        self.inner.read().is_loading
    }

    // -----------------------------------------------------------------------
    // Media
    // -----------------------------------------------------------------------

    /// Insert an item backed by in-memory bytes. The returned item is
    /// already visible; persistence follows in the background.
    pub fn add_media_file(&self, project: Option<&ProjectId>, new: NewMediaFile) -> MediaItem {
        let refs = &self.inner.services.refs;
        let url = refs.create(new.media);
        let thumbnail_url = new.thumbnail.map(|t| refs.create(t));

        let item = {
            let mut state = self.inner.write();
            let folder_id = new.folder_id.filter(|f| state.folder(f).is_some());
            let item = MediaItem {
                id: MediaId::generate(),
                name: new.name,
                kind: new.kind,
                url,
                thumbnail_url,
                duration: new.duration,
                width: new.width,
                height: new.height,
                folder_id,
                project_id: project.cloned(),
                source: new.source,
                ephemeral: new.ephemeral,
            };
            state.insert_media(item.clone());
            self.persist_snapshot(&state);
            item
        };
        debug!(media_id = %item.id, kind = %item.kind, "media file added");
        self.persist_item(item.id.clone());
        item
    }

    /// Remove an item, releasing its transient references first.
    pub fn remove_media_file(&self, project: Option<&ProjectId>, id: &MediaId) -> Option<MediaItem> {
        let removed = {
            let mut state = self.inner.write();
            let removed = state.remove_media(id)?;
            self.inner.release_refs(&removed);
            self.persist_snapshot(&state);
            removed
        };
        debug!(media_id = %id, project = ?project, "media file removed");
        if !removed.ephemeral {
            self.delete_item_file(removed.project_id.clone(), id.clone());
        }
        Some(removed)
    }

    /// Replace the loaded media with the stored unscoped items and the
    /// stored items of `project`.
    ///
    /// Items holding transient references, and items of other projects, are
    /// released and dropped first. Stored payloads come back as fresh
    /// transient references. Returns the number of items restored; store
    /// failures are logged and restore nothing from that scope.
    pub async fn load_project_media(&self, project: &ProjectId) -> usize {
        self.set_active_project(Some(project.clone()));
        let _loading = LoadingGuard::begin(&self.inner);
        self.release_where(|m| {
            !m.transient_urls().is_empty() || m.project_id.as_ref().is_some_and(|p| p != project)
        });
        self.restore_stored_media(Some(project)).await
    }

    /// Restore the stored unscoped items, releasing and dropping items that
    /// hold transient references first.
    pub async fn load_shared_media(&self) -> usize {
        let _loading = LoadingGuard::begin(&self.inner);
        self.release_where(|m| !m.transient_urls().is_empty());
        self.restore_stored_media(None).await
    }

    fn release_where(&self, pred: impl FnMut(&MediaItem) -> bool) {
        let mut state = self.inner.write();
        for item in state.drain_media(pred) {
            self.inner.release_refs(&item);
        }
    }

    /// Insert or replace items from the unscoped records, then from the
    /// records of `project`.
    async fn restore_stored_media(&self, project: Option<&ProjectId>) -> usize {
        let Some(files) = self.inner.services.files.clone() else {
            return 0;
        };
        let mut loaded = Vec::new();
        for scope in std::iter::once(None).chain(project.map(Some)) {
            match files.load(scope).await {
                Ok(records) => loaded.extend(records.into_iter().map(|file| (scope, file))),
                Err(e) => warn!(project = ?scope, error = %e, "failed to load stored media"),
            }
        }

        let restored = {
            let mut state = self.inner.write();
            let mut restored = 0;
            for (scope, file) in loaded {
                if !file.is_restorable() {
                    warn!(media_id = %file.item.id, "stored media has no payload or durable url; skipping");
                    continue;
                }
                let item = self.restore_item(&state, scope, file);
                match state.catalog.media_files.iter_mut().find(|m| m.id == item.id) {
                    Some(existing) => *existing = item,
                    None => state.insert_media(item),
                }
                restored += 1;
            }
            restored
        };
        info!(project = ?project, restored, "stored media restored");
        restored
    }

    fn restore_item(
        &self,
        state: &CatalogState,
        scope: Option<&ProjectId>,
        file: LoadedMediaFile,
    ) -> MediaItem {
        let LoadedMediaFile { mut item, payloads } = file;
        let refs = &self.inner.services.refs;
        item.project_id = scope.cloned();
        if !matches!(item.url_ref(), MediaRef::Durable | MediaRef::Remote) {
            if let Some(media) = payloads.media {
                item.url = refs.create(media);
            }
        }
        if item.thumbnail_url.is_none() {
            item.thumbnail_url = payloads.thumbnail.map(|t| refs.create(t));
        }
        if item.folder_id.as_ref().is_some_and(|f| state.folder(f).is_none()) {
            item.folder_id = None;
        }
        item
    }

    /// Drop every item and user folder, deleting the stored records of the
    /// removed items in the background.
    pub fn clear_project_media(&self, project: &ProjectId) -> usize {
        let removed = self.clear_state();
        debug!(project = %project, removed, "project media cleared");
        removed
    }

    pub fn clear_all_media(&self) -> usize {
        self.clear_state()
    }

    fn clear_state(&self) -> usize {
        let removed = self.clear_memory();
        for item in removed.iter().filter(|m| !m.ephemeral) {
            self.delete_item_file(item.project_id.clone(), item.id.clone());
        }
        removed.len()
    }

    fn clear_memory(&self) -> Vec<MediaItem> {
        let mut state = self.inner.write();
        let removed = state.clear();
        for item in &removed {
            self.inner.release_refs(item);
        }
        self.persist_snapshot(&state);
        debug!(removed = removed.len(), "catalog media cleared");
        removed
    }

    pub fn move_to_folder(&self, id: &MediaId, folder: Option<&FolderId>) -> bool {
        let moved = {
            let mut state = self.inner.write();
            let moved = state.move_to_folder(id, folder);
            if moved {
                self.persist_snapshot(&state);
            }
            moved
        };
        if moved {
            self.persist_item(id.clone());
        }
        moved
    }

    pub fn rename_media_file(&self, id: &MediaId, name: &str) -> bool {
        let renamed = {
            let mut state = self.inner.write();
            let renamed = state.rename_media(id, name);
            if renamed {
                self.persist_snapshot(&state);
            }
            renamed
        };
        if renamed {
            self.persist_item(id.clone());
        }
        renamed
    }

    /// Insert an item for an existing URL. Visual items with an inline or
    /// remote URL are materialized to durable storage in the background.
    pub fn add_media_from_url(&self, new: NewMediaUrl) -> MediaId {
        let id = MediaId::generate();
        let item = {
            let mut state = self.inner.write();
            let folder_id = new.folder_id.filter(|f| state.folder(f).is_some());
            let item = MediaItem {
                id: id.clone(),
                name: new.name,
                kind: new.kind,
                url: new.url,
                thumbnail_url: new.thumbnail_url,
                duration: new.duration,
                width: new.width,
                height: new.height,
                folder_id,
                project_id: new.project_id,
                source: new.source,
                ephemeral: new.ephemeral,
            };
            state.insert_media(item.clone());
            self.persist_snapshot(&state);
            item
        };
        self.persist_item(id.clone());

        if item.kind.is_visual() && item.url_ref().is_materializable() {
            let catalog = self.clone();
            let target = id.clone();
            self.spawn(async move {
                let outcome = catalog
                    .materialize_item(&target, MaterializeScope::Fetchable)
                    .await;
                debug!(media_id = %target, ?outcome, "background materialization finished");
            });
        }
        id
    }

    /// Save the item's references selected by `scope` through the local
    /// saver and swap in the durable results.
    ///
    /// A reference is only replaced if it still equals the one that was
    /// saved, so concurrent edits win; a removed item stays removed.
    pub async fn materialize_item(&self, id: &MediaId, scope: MaterializeScope) -> MaterializeOutcome {
        let Some(item) = self.media_item(id) else {
            return MaterializeOutcome::Discarded;
        };
        let url = scope.accepts(item.url_ref()).then(|| item.url.clone());
        let thumbnail = item
            .thumbnail_url
            .clone()
            .filter(|t| scope.accepts(MediaRef::classify(t)));
        if url.is_none() && thumbnail.is_none() {
            return MaterializeOutcome::Unchanged;
        }

        let category = SystemCategory::for_source(item.source);
        let mut failed = false;
        let mut new_url = None;
        let mut new_thumbnail = None;

        if let Some(source) = &url {
            let filename = format!("{}.{}", id, extension_hint(source, item.kind));
            match self.inner.services.saver.save_locally(source, category, &filename).await {
                Ok(saved) => new_url = migrated_reference(source, saved),
                Err(e) => {
                    warn!(media_id = %id, error = %e, "failed to save media locally");
                    failed = true;
                }
            }
        }
        if let Some(source) = &thumbnail {
            let filename = format!("{}-thumb.{}", id, extension_hint(source, MediaKind::Image));
            match self.inner.services.saver.save_locally(source, category, &filename).await {
                Ok(saved) => new_thumbnail = migrated_reference(source, saved),
                Err(e) => {
                    warn!(media_id = %id, error = %e, "failed to save thumbnail locally");
                    failed = true;
                }
            }
        }

        let changed = {
            let mut state = self.inner.write();
            let Some(current) = state.catalog.media_files.iter_mut().find(|m| &m.id == id) else {
                debug!(media_id = %id, "item removed during materialization; discarding result");
                return MaterializeOutcome::Discarded;
            };
            let mut changed = false;
            if let (Some(original), Some(saved)) = (&url, new_url) {
                if &current.url == original {
                    current.url = saved;
                    changed = true;
                }
            }
            if let (Some(original), Some(saved)) = (&thumbnail, new_thumbnail) {
                if current.thumbnail_url.as_ref() == Some(original) {
                    current.thumbnail_url = Some(saved);
                    changed = true;
                }
            }
            if changed {
                self.persist_snapshot(&state);
            }
            changed
        };

        if changed {
            self.persist_item(id.clone());
            MaterializeOutcome::Migrated
        } else if failed {
            MaterializeOutcome::Failed
        } else {
            MaterializeOutcome::Unchanged
        }
    }

    /// Probe an upload, then add it. Probe failures leave state untouched.
    pub async fn import_upload(
        &self,
        probe: &dyn MediaProbe,
        project: Option<&ProjectId>,
        mut new: NewMediaFile,
    ) -> CatalogResult<MediaItem> {
        let report = probe_media(probe, new.kind, &new.media).await?;
        new.width = new.width.or(report.width);
        new.height = new.height.or(report.height);
        new.duration = new.duration.or(report.duration);
        new.thumbnail = new.thumbnail.or(report.thumbnail);
        Ok(self.add_media_file(project, new))
    }

    // -----------------------------------------------------------------------
    // Folders
    // -----------------------------------------------------------------------

    /// Create a user folder; it is auto-created iff `project` is given.
    pub fn add_folder(
        &self,
        name: &str,
        parent: Option<FolderId>,
        project: Option<ProjectId>,
    ) -> FolderId {
        let mut state = self.inner.write();
        let id = state.add_folder(name, parent, project);
        self.persist_snapshot(&state);
        id
    }

    /// Delete a folder with its descendants. System folders are kept.
    pub fn delete_folder(&self, id: &FolderId) -> bool {
        let mut state = self.inner.write();
        match state.delete_folder(id) {
            Some(deletion) => {
                debug!(
                    folder_id = %id,
                    folders = deletion.removed_folders.len(),
                    reparented = deletion.reparented.len(),
                    "folder deleted"
                );
                self.persist_snapshot(&state);
                true
            }
            None => false,
        }
    }

    pub fn rename_folder(&self, id: &FolderId, name: &str) -> bool {
        let mut state = self.inner.write();
        let renamed = state.rename_folder(id, name);
        if renamed {
            self.persist_snapshot(&state);
        }
        renamed
    }

    pub fn get_or_create_category_folder(&self, category: SystemCategory) -> FolderId {
        let mut state = self.inner.write();
        let (id, created) = state.get_or_create_category_folder(category);
        if created {
            self.persist_snapshot(&state);
        }
        id
    }

    pub fn init_system_folders(&self) -> SystemFolderReport {
        let mut state = self.inner.write();
        let report = state.init_system_folders();
        if report.changed() {
            info!(
                created = report.created.len(),
                legacy_promoted = report.promoted_legacy.is_some(),
                "system folders initialized"
            );
            self.persist_snapshot(&state);
        }
        report
    }

    /// Tag every unscoped item and user folder with `project`.
    pub fn assign_project_to_unscoped(&self, project: &ProjectId) -> usize {
        let (changed, items) = {
            let mut state = self.inner.write();
            let items: Vec<MediaId> = state
                .catalog
                .media_files
                .iter()
                .filter(|m| m.project_id.is_none())
                .map(|m| m.id.clone())
                .collect();
            let changed = state.assign_project_to_unscoped(project);
            if changed > 0 {
                self.persist_snapshot(&state);
            }
            (changed, items)
        };
        for id in items {
            self.delete_item_file(None, id.clone());
            self.persist_item(id);
        }
        info!(project = %project, changed, "unscoped entities assigned to project");
        changed
    }

    /// Queue a file record write for every item still holding an inline
    /// reference. Snapshots drop inline references, so the record is what
    /// keeps the bytes until the item is migrated.
    pub fn persist_inline_payloads(&self) -> usize {
        let ids: Vec<MediaId> = self
            .inner
            .read()
            .catalog
            .media_files
            .iter()
            .filter(|m| !m.ephemeral && m.has_inline_reference())
            .map(|m| m.id.clone())
            .collect();
        let count = ids.len();
        for id in ids {
            self.persist_item(id);
        }
        count
    }

    pub fn repair_dangling_folder_refs(&self) -> usize {
        let mut state = self.inner.write();
        let repaired = state.repair_dangling_folder_refs();
        if repaired > 0 {
            warn!(repaired, "media with missing folders moved to root");
            self.persist_snapshot(&state);
        }
        repaired
    }

    // -----------------------------------------------------------------------
    // Background work
    // -----------------------------------------------------------------------

    /// Wait for every background task spawned so far, including tasks they
    /// spawn in turn.
    pub async fn settle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = std::mem::take(
                &mut *self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    warn!(error = %e, "background catalog task failed");
                }
            }
        }
    }

    /// Write the current snapshot now and report the result.
    pub async fn save_now(&self) -> CatalogResult<()> {
        let Some(partitions) = self.inner.services.partitions.clone() else {
            return Ok(());
        };
        let (generation, catalog) = {
            let state = self.inner.read();
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, state.catalog.clone())
        };
        let project = self.active_project();
        let mut persisted = self.inner.persisted.lock().await;
        partitions.save(&catalog, project.as_ref()).await?;
        *persisted = (*persisted).max(generation);
        Ok(())
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let join = handle.spawn(task);
                let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                tasks.retain(|h| !h.is_finished());
                tasks.push(join);
            }
            Err(_) => warn!("no async runtime available; background catalog task dropped"),
        }
    }

    /// Queue a write of `state`. Called with the state lock held so that
    /// generations follow mutation order; a snapshot older than the last
    /// one written is skipped.
    fn persist_snapshot(&self, state: &CatalogState) {
        let Some(partitions) = self.inner.services.partitions.clone() else {
            return;
        };
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let catalog = state.catalog.clone();
        let project = self.active_project();
        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            let mut persisted = inner.persisted.lock().await;
            if generation <= *persisted {
                debug!(generation, latest = *persisted, "skipping stale catalog snapshot");
                return;
            }
            match partitions.save(&catalog, project.as_ref()).await {
                Ok(()) => *persisted = generation,
                Err(e) => warn!(generation, error = %e, "failed to persist catalog snapshot"),
            }
        });
    }

    /// Queue a write of the item's file record, read from state when the
    /// task runs. Nothing is written if the item is gone by then.
    fn persist_item(&self, id: MediaId) {
        let Some(files) = self.inner.services.files.clone() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            let _io = inner.file_io.lock().await;
            let (project, item, payloads) = {
                let state = inner.read();
                let Some(item) = state.media_item(&id) else {
                    debug!(media_id = %id, "item removed before its record was written");
                    return;
                };
                if item.ephemeral {
                    return;
                }
                (item.project_id.clone(), item.clone(), inner.payloads_of(item))
            };
            if let Err(e) = files.save(project.as_ref(), &item, &payloads).await {
                warn!(media_id = %id, project = ?project, error = %e, "failed to persist media file");
            }
        });
    }

    fn delete_item_file(&self, project: Option<ProjectId>, id: MediaId) {
        let Some(files) = self.inner.services.files.clone() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            let _io = inner.file_io.lock().await;
            if let Err(e) = files.delete(project.as_ref(), &id).await {
                warn!(media_id = %id, project = ?project, error = %e, "failed to delete stored media file");
            }
        });
    }
}

impl std::fmt::Debug for MediaCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read();
        f.debug_struct("MediaCatalog")
            .field("folders", &state.catalog.folders.len())
            .field("media_files", &state.catalog.media_files.len())
            .field("project", &self.active_project())
            .finish()
    }
}

/// File extension for a saved copy of `url`.
fn extension_hint(url: &str, kind: MediaKind) -> &'static str {
    url.strip_prefix("data:")
        .and_then(|rest| rest.split([';', ',']).next())
        .and_then(extension_for_mime)
        .unwrap_or(kind.default_extension())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::{CatalogError, ProbeError, SaveError};
    use crate::files::{KeyedMediaFileStore, StoredMediaFile, SHARED_SCOPE};
    use crate::probe::{Dimensions, VideoFrame};
    use crate::saver::PassthroughSaver;
    use atelier_store::MemoryBackend;
    use atelier_types::{InlineData, DURABLE_PREFIX};

    /// Saves to `atelier-local://<category>/<filename>`, optionally waiting
    /// on a gate first.
    #[derive(Default)]
    struct FakeSaver {
        gate: Option<Arc<Notify>>,
        fail: bool,
    }

    #[async_trait]
    impl LocalSaver for FakeSaver {
        async fn save_locally(
            &self,
            _source: &str,
            category: SystemCategory,
            filename: &str,
        ) -> Result<String, crate::error::SaveError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(SaveError::Unavailable("disk full".into()));
            }
            Ok(format!("{DURABLE_PREFIX}{category}/{filename}"))
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl MediaProbe for FailingProbe {
        async fn image_dimensions(&self, _media: &MediaPayload) -> Result<Dimensions, ProbeError> {
            Err(ProbeError::Decode {
                kind: "image",
                reason: "truncated".into(),
            })
        }

        async fn duration(&self, _media: &MediaPayload, _kind: MediaKind) -> Result<f64, ProbeError> {
            Err(ProbeError::Unsupported("audio"))
        }

        async fn video_frame(&self, _media: &MediaPayload, _at: Duration) -> Result<VideoFrame, ProbeError> {
            Err(ProbeError::Unsupported("video"))
        }
    }

    struct FixedProbe;

    #[async_trait]
    impl MediaProbe for FixedProbe {
        async fn image_dimensions(&self, _media: &MediaPayload) -> Result<Dimensions, ProbeError> {
            Ok(Dimensions { width: 64, height: 32 })
        }

        async fn duration(&self, _media: &MediaPayload, _kind: MediaKind) -> Result<f64, ProbeError> {
            Ok(4.0)
        }

        async fn video_frame(&self, _media: &MediaPayload, _at: Duration) -> Result<VideoFrame, ProbeError> {
            Ok(VideoFrame {
                thumbnail: MediaPayload::new(vec![7], "image/jpeg"),
                width: 1280,
                height: 720,
            })
        }
    }

    fn services(backend: &MemoryBackend, saver: Arc<dyn LocalSaver>) -> CatalogServices {
        CatalogServices::ephemeral(saver)
            .with_partitions(PartitionedStore::new(
                Arc::new(backend.namespace::<Value>("lib:project")),
                Arc::new(backend.namespace::<Value>("lib:shared")),
            ))
            .with_files(Arc::new(KeyedMediaFileStore::new(Arc::new(
                backend.namespace::<StoredMediaFile>("lib:files"),
            ))))
    }

    fn persistent(backend: &MemoryBackend) -> MediaCatalog {
        MediaCatalog::new(services(backend, Arc::new(FakeSaver::default())))
    }

    fn video() -> NewMediaFile {
        NewMediaFile::new("a.mp4", MediaKind::Video, MediaPayload::new(vec![0; 16], "video/mp4"))
    }

    fn partitions(backend: &MemoryBackend) -> PartitionedStore {
        PartitionedStore::new(
            Arc::new(backend.namespace::<Value>("lib:project")),
            Arc::new(backend.namespace::<Value>("lib:shared")),
        )
    }

    #[test]
    fn example_scenario_without_runtime() {
        let catalog = MediaCatalog::new(CatalogServices::ephemeral(Arc::new(PassthroughSaver)));
        let proj1 = ProjectId::new("proj1");

        let f1 = catalog.add_folder("Clips", None, None);
        let item = catalog.add_media_file(Some(&proj1), video().in_folder(f1.clone()));
        assert_eq!(item.project_id, Some(proj1));
        assert_eq!(item.folder_id, Some(f1.clone()));

        assert!(catalog.delete_folder(&f1));
        assert!(catalog.folder(&f1).is_none());
        assert_eq!(catalog.media_item(&item.id).unwrap().folder_id, None);
    }

    #[tokio::test]
    async fn added_media_survives_reload() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        let p = ProjectId::new("p1");
        catalog.set_active_project(Some(p.clone()));
        let item = catalog.add_media_file(Some(&p), video());
        assert!(item.url_ref().is_transient());
        catalog.settle().await;

        let reopened = MediaCatalog::new(services(&backend, Arc::new(FakeSaver::default())));
        assert_eq!(reopened.load_project_media(&p).await, 1);
        let restored = reopened.media_item(&item.id).unwrap();
        assert_eq!(restored.name, "a.mp4");
        assert_eq!(restored.project_id, Some(p));
        let payload = reopened.services().refs.resolve(&restored.url).unwrap();
        assert_eq!(payload.len(), 16);
        assert!(!reopened.is_loading());
    }

    #[tokio::test]
    async fn unscoped_upload_survives_reload_until_cleared() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        let item = catalog.add_media_file(None, video());
        catalog.settle().await;

        let reopened = MediaCatalog::new(services(&backend, Arc::new(FakeSaver::default())));
        assert_eq!(reopened.load_shared_media().await, 1);
        let restored = reopened.media_item(&item.id).unwrap();
        assert_eq!(restored.project_id, None);
        let payload = reopened.services().refs.resolve(&restored.url).unwrap();
        assert_eq!(payload.len(), 16);

        assert_eq!(reopened.clear_all_media(), 1);
        reopened.settle().await;
        assert!(backend
            .get_raw("lib:files", &format!("{SHARED_SCOPE}/{}", item.id))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn inline_records_are_written_for_loaded_items() {
        let backend = MemoryBackend::new();
        let inline = InlineData::encode("image/png", b"PNG");
        let item = MediaItem {
            id: MediaId::new("legacy"),
            name: "legacy.png".into(),
            kind: MediaKind::Image,
            url: inline.clone(),
            thumbnail_url: None,
            duration: None,
            width: None,
            height: None,
            folder_id: None,
            project_id: None,
            source: MediaSource::AiImage,
            ephemeral: false,
        };
        let mut ephemeral = item.clone();
        ephemeral.id = MediaId::new("scratch");
        ephemeral.ephemeral = true;
        let state = CatalogState::new(Catalog::new(vec![], vec![item, ephemeral]));
        let catalog = MediaCatalog::with_state(
            state,
            None,
            services(&backend, Arc::new(FakeSaver::default())),
        );

        assert_eq!(catalog.persist_inline_payloads(), 1);
        catalog.settle().await;

        let files = KeyedMediaFileStore::new(Arc::new(backend.namespace::<StoredMediaFile>("lib:files")));
        let stored = files.load(None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].item.url, inline);
    }

    #[tokio::test]
    async fn remove_releases_refs_once_and_deletes_record() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        let p = ProjectId::new("p1");
        let mut new = video();
        new.thumbnail = Some(MediaPayload::new(vec![1], "image/jpeg"));
        let item = catalog.add_media_file(Some(&p), new);
        assert_eq!(catalog.services().refs.live_count(), 2);
        catalog.settle().await;

        let removed = catalog.remove_media_file(Some(&p), &item.id).unwrap();
        assert_eq!(catalog.services().refs.live_count(), 0);
        assert!(!catalog.services().refs.release(&removed.url));
        assert!(catalog.remove_media_file(Some(&p), &item.id).is_none());
        catalog.settle().await;

        assert!(backend.get_raw("lib:files", &format!("p1/{}", item.id)).unwrap().is_none());
    }

    #[tokio::test]
    async fn removal_before_migration_is_not_undone() {
        let backend = MemoryBackend::new();
        let gate = Arc::new(Notify::new());
        let saver = FakeSaver {
            gate: Some(Arc::clone(&gate)),
            fail: false,
        };
        let catalog = MediaCatalog::new(services(&backend, Arc::new(saver)));

        let id = catalog.add_media_from_url(
            NewMediaUrl::new("remote.png", MediaKind::Image, "https://cdn.example/remote.png")
                .with_project(ProjectId::new("p1")),
        );
        assert!(catalog.remove_media_file(None, &id).is_some());
        gate.notify_one();
        catalog.settle().await;

        assert!(catalog.media_item(&id).is_none());
        let stored = partitions(&backend)
            .load(Some(&ProjectId::new("p1")))
            .await
            .unwrap();
        assert!(stored.media(&id).is_none());
        assert!(backend.get_raw("lib:files", &format!("p1/{id}")).unwrap().is_none());
    }

    #[tokio::test]
    async fn inline_url_is_materialized_in_background() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        let url = InlineData::encode("image/webp", b"RIFF");
        let id = catalog.add_media_from_url(
            NewMediaUrl::new("gen.webp", MediaKind::Image, url).with_source(MediaSource::AiImage),
        );
        catalog.settle().await;

        let item = catalog.media_item(&id).unwrap();
        assert_eq!(item.url, format!("atelier-local://ai-image/{id}.webp"));

        let stored = partitions(&backend).load(None).await.unwrap();
        assert_eq!(stored.media(&id).unwrap().url, item.url);
    }

    #[tokio::test]
    async fn audio_urls_are_not_materialized() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        let id = catalog.add_media_from_url(NewMediaUrl::new(
            "song.mp3",
            MediaKind::Audio,
            "https://cdn.example/song.mp3",
        ));
        catalog.settle().await;
        assert_eq!(catalog.media_item(&id).unwrap().url, "https://cdn.example/song.mp3");
    }

    #[tokio::test]
    async fn failed_materialization_keeps_reference() {
        let saver = FakeSaver {
            gate: None,
            fail: true,
        };
        let catalog = MediaCatalog::new(CatalogServices::ephemeral(Arc::new(saver)));
        let url = InlineData::encode("image/png", b"PNG");
        let id = catalog.add_media_from_url(NewMediaUrl::new("a.png", MediaKind::Image, url.clone()));
        catalog.settle().await;

        assert_eq!(catalog.media_item(&id).unwrap().url, url);
        assert_eq!(
            catalog.materialize_item(&id, MaterializeScope::Inline).await,
            MaterializeOutcome::Failed
        );
        assert_eq!(
            catalog
                .materialize_item(&MediaId::new("ghost"), MaterializeScope::Inline)
                .await,
            MaterializeOutcome::Discarded
        );
    }

    #[tokio::test]
    async fn passthrough_saver_means_no_migration() {
        let catalog = MediaCatalog::new(CatalogServices::ephemeral(Arc::new(PassthroughSaver)));
        let url = InlineData::encode("image/png", b"PNG");
        let id = catalog.add_media_from_url(NewMediaUrl::new("a.png", MediaKind::Image, url.clone()));
        catalog.settle().await;
        assert_eq!(
            catalog.materialize_item(&id, MaterializeScope::Inline).await,
            MaterializeOutcome::Unchanged
        );
        assert_eq!(catalog.media_item(&id).unwrap().url, url);
    }

    #[tokio::test]
    async fn load_releases_previous_refs_and_clears_flag_on_failure() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        catalog.add_media_file(None, video());
        catalog.add_media_file(None, video());
        catalog.settle().await;
        assert_eq!(catalog.services().refs.live_count(), 2);

        backend.set_failing(true);
        assert_eq!(catalog.load_project_media(&ProjectId::new("p1")).await, 0);
        assert_eq!(catalog.services().refs.live_count(), 0);
        assert!(catalog.catalog().media_files.is_empty());
        assert!(!catalog.is_loading());
    }

    #[tokio::test]
    async fn load_keeps_shared_durable_items() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        let shared = catalog.add_media_from_url(NewMediaUrl::new(
            "s.png",
            MediaKind::Image,
            "atelier-local://upload/s.png",
        ));
        catalog.settle().await;
        catalog.load_project_media(&ProjectId::new("p1")).await;
        assert!(catalog.media_item(&shared).is_some());
    }

    #[tokio::test]
    async fn clear_project_media_deletes_records() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        let p = ProjectId::new("p1");
        catalog.init_system_folders();
        let a = catalog.add_media_file(Some(&p), video());
        let b = catalog.add_media_file(Some(&p), video());
        catalog.settle().await;

        assert_eq!(catalog.clear_project_media(&p), 2);
        catalog.settle().await;
        assert_eq!(catalog.services().refs.live_count(), 0);
        assert_eq!(catalog.catalog().folders.len(), SystemCategory::ALL.len());
        for id in [a.id, b.id] {
            assert!(backend.get_raw("lib:files", &format!("p1/{id}")).unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn persistence_failures_do_not_touch_memory() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        backend.set_failing(true);

        let folder = catalog.add_folder("Clips", None, None);
        let item = catalog.add_media_file(Some(&ProjectId::new("p1")), video().in_folder(folder.clone()));
        catalog.settle().await;

        assert!(catalog.folder(&folder).is_some());
        assert!(catalog.media_item(&item.id).is_some());
        assert!(matches!(catalog.save_now().await, Err(CatalogError::Partition(_))));
    }

    #[tokio::test]
    async fn latest_snapshot_wins() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        let f = catalog.add_folder("v1", None, None);
        for n in 2..=20 {
            catalog.rename_folder(&f, &format!("v{n}"));
        }
        catalog.settle().await;

        let stored = partitions(&backend).load(None).await.unwrap();
        assert_eq!(stored.folder(&f).unwrap().name, "v20");
    }

    #[tokio::test]
    async fn rename_and_move_rewrite_file_record() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        let p = ProjectId::new("p1");
        let folder = catalog.add_folder("Clips", None, Some(p.clone()));
        let item = catalog.add_media_file(Some(&p), video());
        assert!(catalog.rename_media_file(&item.id, "renamed.mp4"));
        assert!(catalog.move_to_folder(&item.id, Some(&folder)));
        catalog.settle().await;

        let raw = backend
            .get_raw("lib:files", &format!("p1/{}", item.id))
            .unwrap()
            .unwrap();
        let stored: StoredMediaFile = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.record.name, "renamed.mp4");
        assert_eq!(stored.record.folder_id, Some(folder));
        assert!(stored.payload.is_some());
    }

    #[tokio::test]
    async fn import_upload_probes_first() {
        let catalog = MediaCatalog::new(CatalogServices::ephemeral(Arc::new(PassthroughSaver)));

        let err = catalog.import_upload(&FailingProbe, None, video()).await;
        assert!(matches!(err, Err(CatalogError::Probe(_))));
        assert!(catalog.catalog().is_empty());
        assert_eq!(catalog.services().refs.live_count(), 0);

        let item = catalog.import_upload(&FixedProbe, None, video()).await.unwrap();
        assert_eq!(item.duration, Some(4.0));
        assert_eq!((item.width, item.height), (Some(1280), Some(720)));
        assert!(item.thumbnail_ref().is_some_and(|r| r.is_transient()));
    }

    #[tokio::test]
    async fn assign_project_persists_newly_scoped_items() {
        let backend = MemoryBackend::new();
        let catalog = persistent(&backend);
        let item = catalog.add_media_file(None, video());
        let folder = catalog.add_folder("Loose", None, None);
        catalog.init_system_folders();

        let p = ProjectId::new("p1");
        assert_eq!(catalog.assign_project_to_unscoped(&p), 2);
        catalog.settle().await;

        assert_eq!(catalog.folder(&folder).unwrap().project_id, Some(p.clone()));
        assert!(catalog
            .category_folder(SystemCategory::Upload)
            .is_some_and(|f| f.project_id.is_none()));
        assert!(backend
            .get_raw("lib:files", &format!("p1/{}", item.id))
            .unwrap()
            .is_some());
        assert!(backend
            .get_raw("lib:files", &format!("{SHARED_SCOPE}/{}", item.id))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_folder_on_add_goes_to_root() {
        let catalog = MediaCatalog::new(CatalogServices::ephemeral(Arc::new(PassthroughSaver)));
        let item = catalog.add_media_file(None, video().in_folder(FolderId::new("ghost")));
        assert_eq!(item.folder_id, None);
    }

    #[test]
    fn extension_hint_prefers_inline_mime() {
        assert_eq!(extension_hint("data:image/webp;base64,AA==", MediaKind::Image), "webp");
        assert_eq!(extension_hint("data:,hello", MediaKind::Image), "png");
        assert_eq!(extension_hint("https://cdn.example/a", MediaKind::Video), "mp4");
    }
}
