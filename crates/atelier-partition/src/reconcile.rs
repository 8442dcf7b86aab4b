//! Lenient reconciliation of persisted partitions.
//!
//! Persisted data may come from older builds, partial writes, or manual
//! edits. Instead of rejecting it, every record is rebuilt field by field
//! against the in-code default shape: present and well-typed values win,
//! anything missing or ill-typed falls back to the default, and unknown
//! fields are ignored. Only records that cannot be identified (no usable
//! `id`, or for media no recognized `type`) are dropped.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::warn;

use atelier_types::{
    Catalog, Folder, FolderId, MediaId, MediaItem, MediaKind, MediaSource, ProjectId,
    SystemCategory,
};

const DEFAULT_FOLDER_NAME: &str = "Untitled folder";
const DEFAULT_MEDIA_NAME: &str = "Untitled";

/// Rebuild a partition from whatever JSON was persisted.
///
/// Accepts the current envelope (`{version, folders, mediaFiles}`) and the
/// older wrapped form (`{state: {folders, mediaFiles}, version}`). Anything
/// else yields an empty catalog.
pub fn reconcile_partition(value: &Value) -> Catalog {
    let root = match value.get("state") {
        Some(state @ Value::Object(_)) => state,
        _ => value,
    };
    let Some(obj) = root.as_object() else {
        if !value.is_null() {
            warn!("persisted partition is not an object; ignoring it");
        }
        return Catalog::default();
    };

    let mut seen_folders = HashSet::new();
    let folders = records(obj, "folders")
        .enumerate()
        .filter_map(|(index, raw)| {
            let folder = reconcile_folder(raw);
            if folder.is_none() {
                warn!(index, "skipping unreadable persisted folder");
            }
            folder
        })
        .filter(|f| {
            let fresh = seen_folders.insert(f.id.clone());
            if !fresh {
                warn!(folder_id = %f.id, "skipping duplicate persisted folder");
            }
            fresh
        })
        .collect();

    let mut seen_media = HashSet::new();
    let media_files = records(obj, "mediaFiles")
        .enumerate()
        .filter_map(|(index, raw)| {
            let item = reconcile_media_item(raw);
            if item.is_none() {
                warn!(index, "skipping unreadable persisted media item");
            }
            item
        })
        .filter(|m| {
            let fresh = seen_media.insert(m.id.clone());
            if !fresh {
                warn!(media_id = %m.id, "skipping duplicate persisted media item");
            }
            fresh
        })
        .collect();

    Catalog {
        folders,
        media_files,
    }
}

/// Rebuild one folder. Returns `None` when no usable `id` is present.
pub fn reconcile_folder(value: &Value) -> Option<Folder> {
    let obj = value.as_object()?;
    let id = FolderId::new(id_field(obj, "id")?);
    let is_system = bool_field(obj, "isSystem");
    let category = is_system
        .then(|| str_field(obj, "category").and_then(|c| c.parse::<SystemCategory>().ok()))
        .flatten();

    Some(Folder {
        id,
        name: str_field(obj, "name").unwrap_or(DEFAULT_FOLDER_NAME).to_string(),
        parent_id: id_field(obj, "parentId").map(FolderId::new),
        // System folders are global by definition.
        project_id: if is_system {
            None
        } else {
            id_field(obj, "projectId").map(ProjectId::new)
        },
        is_system,
        is_auto_created: !is_system && bool_field(obj, "isAutoCreated"),
        category,
        created_at: timestamp_field(obj, "createdAt").unwrap_or(0),
    })
}

/// Rebuild one media item. Returns `None` without a usable `id` or a
/// recognized `type`.
pub fn reconcile_media_item(value: &Value) -> Option<MediaItem> {
    let obj = value.as_object()?;
    let id = MediaId::new(id_field(obj, "id")?);
    let kind = str_field(obj, "type")?.parse::<MediaKind>().ok()?;

    Some(MediaItem {
        id,
        name: str_field(obj, "name").unwrap_or(DEFAULT_MEDIA_NAME).to_string(),
        kind,
        url: str_field(obj, "url").unwrap_or_default().to_string(),
        thumbnail_url: str_field(obj, "thumbnailUrl").map(str::to_string),
        duration: obj
            .get("duration")
            .and_then(Value::as_f64)
            .filter(|d| d.is_finite() && *d >= 0.0),
        width: dimension_field(obj, "width"),
        height: dimension_field(obj, "height"),
        folder_id: id_field(obj, "folderId").map(FolderId::new),
        project_id: id_field(obj, "projectId").map(ProjectId::new),
        source: str_field(obj, "source")
            .and_then(|s| s.parse::<MediaSource>().ok())
            .unwrap_or_default(),
        ephemeral: false,
    })
}

fn records<'a>(obj: &'a Map<String, Value>, field: &str) -> impl Iterator<Item = &'a Value> {
    obj.get(field)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .into_iter()
        .flatten()
}

fn str_field<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    obj.get(field).and_then(Value::as_str)
}

fn bool_field(obj: &Map<String, Value>, field: &str) -> bool {
    obj.get(field).and_then(Value::as_bool).unwrap_or(false)
}

/// Non-empty string ids; numeric ids from older builds are stringified.
fn id_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn dimension_field(obj: &Map<String, Value>, field: &str) -> Option<u32> {
    let v = obj.get(field)?;
    if let Some(n) = v.as_u64() {
        return u32::try_from(n).ok();
    }
    v.as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && *f <= f64::from(u32::MAX))
        .map(|f| f.round() as u32)
}

/// Unix milliseconds, or an RFC 3339 string.
fn timestamp_field(obj: &Map<String, Value>, field: &str) -> Option<i64> {
    match obj.get(field)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}
