use atelier_types::{Catalog, Folder, MediaItem, ProjectId};

/// The two disjoint views produced by [`split`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Partitions {
    pub project: Catalog,
    pub shared: Catalog,
}

fn belongs_to_project(folder: &Folder, project: &ProjectId) -> bool {
    !folder.is_system && folder.project_id.as_ref() == Some(project)
}

/// Auto-created folders that have not been assigned a project yet are in
/// neither partition.
fn belongs_to_shared(folder: &Folder) -> bool {
    folder.is_system || (folder.project_id.is_none() && !folder.is_auto_created)
}

/// Folders and items scoped to `project`.
pub fn project_partition(catalog: &Catalog, project: &ProjectId) -> Catalog {
    Catalog {
        folders: catalog
            .folders
            .iter()
            .filter(|f| belongs_to_project(f, project))
            .cloned()
            .collect(),
        media_files: catalog
            .media_files
            .iter()
            .filter(|m| m.project_id.as_ref() == Some(project))
            .cloned()
            .collect(),
    }
}

/// System folders, unscoped user folders, and unscoped items.
pub fn shared_partition(catalog: &Catalog) -> Catalog {
    Catalog {
        folders: catalog
            .folders
            .iter()
            .filter(|f| belongs_to_shared(f))
            .cloned()
            .collect(),
        media_files: catalog
            .media_files
            .iter()
            .filter(|m: &&MediaItem| m.project_id.is_none())
            .cloned()
            .collect(),
    }
}

/// Divide `catalog` into the partition scoped to `project` and the shared
/// partition. The two are disjoint by id.
pub fn split(catalog: &Catalog, project: &ProjectId) -> Partitions {
    Partitions {
        project: project_partition(catalog, project),
        shared: shared_partition(catalog),
    }
}

/// Recombine partitions: shared folders/items first, then project ones.
///
/// Order-stable but not deduplicating. Callers guarantee the partitions are
/// disjoint by id, which holds whenever both were produced by [`split`].
pub fn merge(project: &Catalog, shared: &Catalog) -> Catalog {
    Catalog {
        folders: shared
            .folders
            .iter()
            .chain(project.folders.iter())
            .cloned()
            .collect(),
        media_files: shared
            .media_files
            .iter()
            .chain(project.media_files.iter())
            .cloned()
            .collect(),
    }
}
