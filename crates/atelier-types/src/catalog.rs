use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::folder::{Folder, SystemCategory};
use crate::identity::{FolderId, MediaId};
use crate::media::MediaItem;

/// The combined set of folders and media items.
///
/// Both collections are append-ordered and keyed by `id`. Order carries no
/// meaning beyond display stability.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub media_files: Vec<MediaItem>,
}

impl Catalog {
    pub fn new(folders: Vec<Folder>, media_files: Vec<MediaItem>) -> Self {
        Self {
            folders,
            media_files,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.media_files.is_empty()
    }

    pub fn folder(&self, id: &FolderId) -> Option<&Folder> {
        self.folders.iter().find(|f| &f.id == id)
    }

    pub fn media(&self, id: &MediaId) -> Option<&MediaItem> {
        self.media_files.iter().find(|m| &m.id == id)
    }

    /// The system folder owning `category`, if one exists.
    pub fn system_folder(&self, category: SystemCategory) -> Option<&Folder> {
        self.folders
            .iter()
            .find(|f| f.is_system && f.category == Some(category))
    }

    /// `root` plus every folder transitively parented under it.
    ///
    /// Computed as a depth-first closure over `parent_id`; a `parent_id`
    /// cycle in malformed data terminates because visited ids are skipped.
    pub fn subtree_ids(&self, root: &FolderId) -> HashSet<FolderId> {
        let mut visited = HashSet::new();
        let mut stack = vec![root.clone()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            stack.extend(
                self.folders
                    .iter()
                    .filter(|f| f.parent_id.as_ref() == Some(&id))
                    .map(|f| f.id.clone()),
            );
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: &str, parent: Option<&str>) -> Folder {
        let mut f = Folder::user(id, parent.map(FolderId::new), None);
        f.id = FolderId::new(id);
        f
    }

    #[test]
    fn subtree_includes_root_and_descendants() {
        let catalog = Catalog::new(
            vec![
                folder("a", None),
                folder("b", Some("a")),
                folder("c", Some("b")),
                folder("d", None),
            ],
            vec![],
        );
        let ids = catalog.subtree_ids(&FolderId::new("a"));
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&FolderId::new("d")));
    }

    #[test]
    fn subtree_terminates_on_cycles() {
        let catalog = Catalog::new(vec![folder("a", Some("b")), folder("b", Some("a"))], vec![]);
        let ids = catalog.subtree_ids(&FolderId::new("a"));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn system_folder_lookup_ignores_user_folders() {
        let mut user = folder("x", None);
        user.category = Some(SystemCategory::Upload);
        let system = Folder::system(SystemCategory::Upload);
        let catalog = Catalog::new(vec![user, system.clone()], vec![]);
        assert_eq!(catalog.system_folder(SystemCategory::Upload), Some(&system));
        assert!(catalog.system_folder(SystemCategory::AiImage).is_none());
    }
}
