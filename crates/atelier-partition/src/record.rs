use serde::{Deserialize, Serialize};

use atelier_types::{
    Catalog, Folder, FolderId, MediaId, MediaItem, MediaKind, MediaRef, MediaSource, ProjectId,
};

/// Envelope version written with every partition.
pub const PARTITION_VERSION: u32 = 1;

/// On-disk shape of a media item.
///
/// Transient and inline references are dropped before writing; they are
/// reconstructed (from stored payloads) or re-fetched at load time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMediaItem {
    pub id: MediaId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub folder_id: Option<FolderId>,
    pub project_id: Option<ProjectId>,
    pub source: MediaSource,
}

fn persistable(url: &str) -> Option<String> {
    MediaRef::classify(url)
        .is_persistable()
        .then(|| url.to_string())
}

impl PersistedMediaItem {
    /// Strip an item down to its persistable shape. Ephemeral items are
    /// never persisted.
    pub fn from_item(item: &MediaItem) -> Option<Self> {
        if item.ephemeral {
            return None;
        }
        Some(Self {
            id: item.id.clone(),
            name: item.name.clone(),
            kind: item.kind,
            url: persistable(&item.url).filter(|u| !u.is_empty()),
            thumbnail_url: item.thumbnail_url.as_deref().and_then(persistable),
            duration: item.duration,
            width: item.width,
            height: item.height,
            folder_id: item.folder_id.clone(),
            project_id: item.project_id.clone(),
            source: item.source,
        })
    }

    /// Rebuild an in-memory item. A missing URL becomes empty until the
    /// payload store or a re-fetch supplies one.
    pub fn into_item(self) -> MediaItem {
        MediaItem {
            id: self.id,
            name: self.name,
            kind: self.kind,
            url: self.url.unwrap_or_default(),
            thumbnail_url: self.thumbnail_url,
            duration: self.duration,
            width: self.width,
            height: self.height,
            folder_id: self.folder_id,
            project_id: self.project_id,
            source: self.source,
            ephemeral: false,
        }
    }
}

/// The envelope written to each partition namespace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedPartition {
    pub version: u32,
    pub folders: Vec<Folder>,
    pub media_files: Vec<PersistedMediaItem>,
}

impl PersistedPartition {
    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self {
            version: PARTITION_VERSION,
            folders: catalog.folders.clone(),
            media_files: catalog
                .media_files
                .iter()
                .filter_map(PersistedMediaItem::from_item)
                .collect(),
        }
    }

    pub fn into_catalog(self) -> Catalog {
        Catalog {
            folders: self.folders,
            media_files: self
                .media_files
                .into_iter()
                .map(PersistedMediaItem::into_item)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, thumb: Option<&str>) -> MediaItem {
        MediaItem {
            id: MediaId::new("m1"),
            name: "shot.png".into(),
            kind: MediaKind::Image,
            url: url.into(),
            thumbnail_url: thumb.map(str::to_string),
            duration: None,
            width: Some(640),
            height: Some(480),
            folder_id: None,
            project_id: Some(ProjectId::new("p1")),
            source: MediaSource::AiImage,
            ephemeral: false,
        }
    }

    #[test]
    fn strips_transient_and_inline_references() {
        let persisted =
            PersistedMediaItem::from_item(&item("blob:atelier/1", Some("data:image/png;base64,AA==")))
                .unwrap();
        assert_eq!(persisted.url, None);
        assert_eq!(persisted.thumbnail_url, None);

        let json = serde_json::to_value(&persisted).unwrap();
        assert!(json.get("url").is_none());
        assert!(json.get("thumbnailUrl").is_none());
    }

    #[test]
    fn keeps_durable_and_remote_references() {
        let persisted = PersistedMediaItem::from_item(&item(
            "atelier-local://ai-image/a.png",
            Some("https://cdn.example/t.jpg"),
        ))
        .unwrap();
        assert_eq!(persisted.url.as_deref(), Some("atelier-local://ai-image/a.png"));
        assert_eq!(persisted.thumbnail_url.as_deref(), Some("https://cdn.example/t.jpg"));
    }

    #[test]
    fn ephemeral_items_are_not_persisted() {
        let mut it = item("https://cdn.example/a.png", None);
        it.ephemeral = true;
        assert!(PersistedMediaItem::from_item(&it).is_none());

        let catalog = Catalog::new(vec![], vec![it]);
        assert!(PersistedPartition::from_catalog(&catalog).media_files.is_empty());
    }

    #[test]
    fn envelope_carries_version() {
        let partition = PersistedPartition::from_catalog(&Catalog::default());
        let json = serde_json::to_value(&partition).unwrap();
        assert_eq!(json["version"], PARTITION_VERSION);
        assert!(json["mediaFiles"].as_array().unwrap().is_empty());
    }

    #[test]
    fn into_item_defaults_missing_url() {
        let persisted = PersistedMediaItem::from_item(&item("blob:atelier/1", None)).unwrap();
        let restored = persisted.into_item();
        assert_eq!(restored.url, "");
        assert_eq!(restored.width, Some(640));
        assert!(!restored.ephemeral);
    }
}
