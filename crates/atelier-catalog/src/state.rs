//! The catalog state machine.
//!
//! [`CatalogState`] holds folders, media items, and selection state. Every
//! method here is plain data manipulation: it cannot fail and performs no
//! I/O. [`MediaCatalog`](crate::MediaCatalog) wraps it with persistence.

use std::collections::HashSet;

use tracing::{debug, info};

use atelier_types::{
    Catalog, Folder, FolderId, MediaId, MediaItem, ProjectId, SystemCategory,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogState {
    pub catalog: Catalog,
    pub current_folder_id: Option<FolderId>,
    pub is_loading: bool,
}

/// What [`CatalogState::delete_folder`] removed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FolderDeletion {
    pub removed_folders: HashSet<FolderId>,
    /// Items moved to the root because their folder was removed.
    pub reparented: Vec<MediaId>,
}

/// Outcome of [`CatalogState::init_system_folders`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemFolderReport {
    pub created: Vec<SystemCategory>,
    /// Id of a legacy folder promoted to the `ai-image` system folder.
    pub promoted_legacy: Option<FolderId>,
    /// Duplicate system folders folded into the first of their category.
    pub merged_duplicates: Vec<FolderId>,
}

impl SystemFolderReport {
    pub fn changed(&self) -> bool {
        !self.created.is_empty() || self.promoted_legacy.is_some() || !self.merged_duplicates.is_empty()
    }
}

impl CatalogState {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn media_item(&self, id: &MediaId) -> Option<&MediaItem> {
        self.catalog.media(id)
    }

    pub fn folder(&self, id: &FolderId) -> Option<&Folder> {
        self.catalog.folder(id)
    }

    /// Items directly inside `folder`; `None` means the root.
    pub fn media_in_folder(&self, folder: Option<&FolderId>) -> Vec<&MediaItem> {
        self.catalog
            .media_files
            .iter()
            .filter(|m| m.folder_id.as_ref() == folder)
            .collect()
    }

    /// Folders directly under `parent`; `None` means the root.
    pub fn child_folders(&self, parent: Option<&FolderId>) -> Vec<&Folder> {
        self.catalog
            .folders
            .iter()
            .filter(|f| f.parent_id.as_ref() == parent)
            .collect()
    }

    /// Breadcrumb from the root down to `id`. Empty if `id` is unknown.
    pub fn folder_path(&self, id: &FolderId) -> Vec<&Folder> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.catalog.folder(id);
        while let Some(folder) = cursor {
            if !seen.insert(&folder.id) {
                break;
            }
            path.push(folder);
            cursor = folder
                .parent_id
                .as_ref()
                .and_then(|parent| self.catalog.folder(parent));
        }
        path.reverse();
        path
    }

    pub fn media_for_project(&self, project: &ProjectId) -> Vec<&MediaItem> {
        self.catalog
            .media_files
            .iter()
            .filter(|m| m.project_id.as_ref() == Some(project))
            .collect()
    }

    pub fn category_folder(&self, category: SystemCategory) -> Option<&Folder> {
        self.catalog.system_folder(category)
    }

    /// Select a folder. Unknown ids select nothing.
    pub fn set_current_folder(&mut self, id: Option<FolderId>) -> bool {
        match id {
            Some(id) if self.catalog.folder(&id).is_none() => false,
            id => {
                self.current_folder_id = id;
                true
            }
        }
    }

    // -----------------------------------------------------------------------
    // Media
    // -----------------------------------------------------------------------

    pub fn insert_media(&mut self, item: MediaItem) {
        self.catalog.media_files.push(item);
    }

    pub fn remove_media(&mut self, id: &MediaId) -> Option<MediaItem> {
        let index = self.catalog.media_files.iter().position(|m| &m.id == id)?;
        Some(self.catalog.media_files.remove(index))
    }

    /// Apply `update` to the item with `id`. Returns `false` if it is absent.
    pub fn update_media(&mut self, id: &MediaId, update: impl FnOnce(&mut MediaItem)) -> bool {
        match self.catalog.media_files.iter_mut().find(|m| &m.id == id) {
            Some(item) => {
                update(item);
                true
            }
            None => false,
        }
    }

    /// Remove every item matching `pred`, returning them in order.
    pub fn drain_media(&mut self, mut pred: impl FnMut(&MediaItem) -> bool) -> Vec<MediaItem> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.catalog.media_files)
            .into_iter()
            .partition(|m| pred(m));
        self.catalog.media_files = kept;
        removed
    }

    pub fn rename_media(&mut self, id: &MediaId, name: &str) -> bool {
        self.update_media(id, |m| m.name = name.to_string())
    }

    /// Move an item into `folder` (or the root). Fails if either is unknown.
    pub fn move_to_folder(&mut self, id: &MediaId, folder: Option<&FolderId>) -> bool {
        if folder.is_some_and(|f| self.catalog.folder(f).is_none()) {
            return false;
        }
        self.update_media(id, |m| m.folder_id = folder.cloned())
    }

    /// Drop all media and user folders; system folders stay.
    pub fn clear(&mut self) -> Vec<MediaItem> {
        self.catalog.folders.retain(|f| f.is_system);
        self.current_folder_id = None;
        std::mem::take(&mut self.catalog.media_files)
    }

    // -----------------------------------------------------------------------
    // Folders
    // -----------------------------------------------------------------------

    pub fn add_folder(
        &mut self,
        name: &str,
        parent: Option<FolderId>,
        project: Option<ProjectId>,
    ) -> FolderId {
        let folder = Folder::user(name, parent, project);
        let id = folder.id.clone();
        self.catalog.folders.push(folder);
        id
    }

    pub fn rename_folder(&mut self, id: &FolderId, name: &str) -> bool {
        match self.catalog.folders.iter_mut().find(|f| &f.id == id) {
            Some(folder) => {
                folder.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Delete a folder and its descendants, moving their items to the root.
    ///
    /// System folders and unknown ids are left alone (`None`).
    pub fn delete_folder(&mut self, id: &FolderId) -> Option<FolderDeletion> {
        let target = self.catalog.folder(id)?;
        if target.is_system {
            return None;
        }

        let removed = self.catalog.subtree_ids(id);
        self.catalog.folders.retain(|f| !removed.contains(&f.id));

        let mut reparented = Vec::new();
        for item in &mut self.catalog.media_files {
            if item.folder_id.as_ref().is_some_and(|f| removed.contains(f)) {
                item.folder_id = None;
                reparented.push(item.id.clone());
            }
        }
        if self
            .current_folder_id
            .as_ref()
            .is_some_and(|f| removed.contains(f))
        {
            self.current_folder_id = None;
        }

        Some(FolderDeletion {
            removed_folders: removed,
            reparented,
        })
    }

    /// The system folder for `category`, created if missing.
    /// Returns the id and whether it was created.
    pub fn get_or_create_category_folder(&mut self, category: SystemCategory) -> (FolderId, bool) {
        if let Some(existing) = self.catalog.system_folder(category) {
            return (existing.id.clone(), false);
        }
        let folder = Folder::system(category);
        let id = folder.id.clone();
        self.catalog.folders.push(folder);
        (id, true)
    }

    /// Ensure exactly one system folder per category.
    ///
    /// A root user folder named [`LEGACY_AI_FOLDER_NAME`] is promoted in
    /// place to the `ai-image` folder when none exists yet.
    ///
    /// [`LEGACY_AI_FOLDER_NAME`]: atelier_types::LEGACY_AI_FOLDER_NAME
    pub fn init_system_folders(&mut self) -> SystemFolderReport {
        let mut report = SystemFolderReport {
            merged_duplicates: self.merge_duplicate_system_folders(),
            ..SystemFolderReport::default()
        };

        for folder in self.catalog.folders.iter_mut().filter(|f| f.is_system) {
            folder.project_id = None;
            folder.is_auto_created = false;
        }

        if self.catalog.system_folder(SystemCategory::AiImage).is_none() {
            if let Some(legacy) = self
                .catalog
                .folders
                .iter_mut()
                .find(|f| f.is_legacy_ai_folder())
            {
                legacy.is_system = true;
                legacy.is_auto_created = false;
                legacy.project_id = None;
                legacy.category = Some(SystemCategory::AiImage);
                legacy.name = SystemCategory::AiImage.display_name().to_string();
                info!(folder_id = %legacy.id, "legacy folder promoted to system folder");
                report.promoted_legacy = Some(legacy.id.clone());
            }
        }

        for category in SystemCategory::ALL {
            let (_, created) = self.get_or_create_category_folder(category);
            if created {
                report.created.push(category);
            }
        }
        if report.changed() {
            debug!(
                created = report.created.len(),
                merged = report.merged_duplicates.len(),
                "system folders initialized"
            );
        }
        report
    }

    /// Fold later system folders of a category into the first one, moving
    /// their items and child folders.
    fn merge_duplicate_system_folders(&mut self) -> Vec<FolderId> {
        let mut merged = Vec::new();
        for category in SystemCategory::ALL {
            let mut ids = self
                .catalog
                .folders
                .iter()
                .filter(|f| f.is_system && f.category == Some(category))
                .map(|f| f.id.clone());
            let Some(keep) = ids.next() else { continue };
            let duplicates: HashSet<FolderId> = ids.collect();
            if duplicates.is_empty() {
                continue;
            }

            for item in &mut self.catalog.media_files {
                if item.folder_id.as_ref().is_some_and(|f| duplicates.contains(f)) {
                    item.folder_id = Some(keep.clone());
                }
            }
            for folder in &mut self.catalog.folders {
                if folder.parent_id.as_ref().is_some_and(|p| duplicates.contains(p)) {
                    folder.parent_id = Some(keep.clone());
                }
            }
            if self
                .current_folder_id
                .as_ref()
                .is_some_and(|f| duplicates.contains(f))
            {
                self.current_folder_id = Some(keep.clone());
            }
            self.catalog.folders.retain(|f| !duplicates.contains(&f.id));
            merged.extend(duplicates);
        }
        merged
    }

    // -----------------------------------------------------------------------
    // Repairs and bulk tagging
    // -----------------------------------------------------------------------

    /// Stamp `project` on every unscoped item and user folder. Returns the
    /// number of entities changed.
    pub fn assign_project_to_unscoped(&mut self, project: &ProjectId) -> usize {
        let mut changed = 0;
        for folder in &mut self.catalog.folders {
            if !folder.is_system && folder.project_id.is_none() {
                folder.project_id = Some(project.clone());
                changed += 1;
            }
        }
        for item in &mut self.catalog.media_files {
            if item.project_id.is_none() {
                item.project_id = Some(project.clone());
                changed += 1;
            }
        }
        changed
    }

    /// Move items whose folder no longer exists to the root.
    pub fn repair_dangling_folder_refs(&mut self) -> usize {
        let known: HashSet<FolderId> = self.catalog.folders.iter().map(|f| f.id.clone()).collect();
        let mut repaired = 0;
        for item in &mut self.catalog.media_files {
            if item.folder_id.as_ref().is_some_and(|f| !known.contains(f)) {
                item.folder_id = None;
                repaired += 1;
            }
        }
        if self
            .current_folder_id
            .as_ref()
            .is_some_and(|f| !known.contains(f))
        {
            self.current_folder_id = None;
        }
        repaired
    }
}
