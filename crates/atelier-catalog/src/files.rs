//! Payload persistence for media items.
//!
//! Each item is stored as its persistable record plus, when the bytes are
//! only held in memory, a base64 copy of the payload. Items of a project are
//! keyed under that project; unscoped items share the [`SHARED_SCOPE`]
//! prefix. Loading turns payloads back into transient references.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use atelier_partition::PersistedMediaItem;
use atelier_store::{KeyedStore, StoreError};
use atelier_types::{InlineData, MediaId, MediaItem, MediaRef, ProjectId};

use crate::error::{CatalogError, CatalogResult};
use crate::payload::MediaPayload;

/// Key prefix for records of items that belong to no project.
pub const SHARED_SCOPE: &str = "~shared";

/// Base64 payload as written to the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPayload {
    pub mime: String,
    pub data: String,
    /// The bytes came from an inline reference that has not been moved to
    /// durable storage yet. Loading turns them back into an inline
    /// reference so the startup migration scan retries them.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inline: bool,
}

impl StoredPayload {
    pub fn encode(payload: &MediaPayload) -> Self {
        Self {
            mime: payload.mime.clone(),
            data: STANDARD.encode(&payload.bytes),
            inline: false,
        }
    }

    fn encode_inline(payload: &MediaPayload) -> Self {
        Self {
            inline: true,
            ..Self::encode(payload)
        }
    }

    pub fn decode(&self) -> CatalogResult<MediaPayload> {
        let bytes = STANDARD
            .decode(&self.data)
            .map_err(|e| CatalogError::Payload(e.to_string()))?;
        Ok(MediaPayload::new(bytes, self.mime.clone()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredMediaFile {
    pub record: PersistedMediaItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StoredPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<StoredPayload>,
}

/// In-memory bytes behind an item's media and thumbnail references.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemPayloads {
    pub media: Option<MediaPayload>,
    pub thumbnail: Option<MediaPayload>,
}

/// A media file read back from storage.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedMediaFile {
    pub item: MediaItem,
    pub payloads: ItemPayloads,
}

impl LoadedMediaFile {
    /// Whether the item can be shown: it needs bytes or a reference that
    /// survives restarts.
    pub fn is_restorable(&self) -> bool {
        self.payloads.media.is_some()
            || matches!(
                self.item.url_ref(),
                MediaRef::Durable | MediaRef::Remote | MediaRef::Inline
            )
    }
}

/// Storage of media records and their bytes, scoped by project. A `None`
/// scope addresses unscoped items.
#[async_trait]
pub trait MediaFileStore: Send + Sync {
    /// Persist `item` under `scope`. `payloads` carries bytes that only
    /// exist in memory; inline URLs are decoded into payloads here.
    async fn save(
        &self,
        scope: Option<&ProjectId>,
        item: &MediaItem,
        payloads: &ItemPayloads,
    ) -> CatalogResult<()>;

    /// Every readable record of `scope`, in key order.
    async fn load(&self, scope: Option<&ProjectId>) -> CatalogResult<Vec<LoadedMediaFile>>;

    async fn delete(&self, scope: Option<&ProjectId>, id: &MediaId) -> CatalogResult<()>;
}

/// [`MediaFileStore`] over a [`KeyedStore`] namespace, keyed
/// `"{project}/{media id}"` or `"~shared/{media id}"`.
#[derive(Clone)]
pub struct KeyedMediaFileStore {
    store: Arc<dyn KeyedStore<StoredMediaFile>>,
}

impl KeyedMediaFileStore {
    pub fn new(store: Arc<dyn KeyedStore<StoredMediaFile>>) -> Self {
        Self { store }
    }

    fn prefix(scope: Option<&ProjectId>) -> String {
        match scope {
            Some(project) => format!("{project}/"),
            None => format!("{SHARED_SCOPE}/"),
        }
    }

    fn key(scope: Option<&ProjectId>, id: &MediaId) -> String {
        format!("{}{id}", Self::prefix(scope))
    }
}

#[async_trait]
impl MediaFileStore for KeyedMediaFileStore {
    async fn save(
        &self,
        scope: Option<&ProjectId>,
        item: &MediaItem,
        payloads: &ItemPayloads,
    ) -> CatalogResult<()> {
        let Some(mut record) = PersistedMediaItem::from_item(item) else {
            return Ok(());
        };
        record.project_id = scope.cloned();

        let payload = stored_payload(payloads.media.as_ref(), Some(&item.url))?;
        let thumbnail = stored_payload(payloads.thumbnail.as_ref(), item.thumbnail_url.as_deref())?;

        let key = Self::key(scope, &item.id);
        self.store
            .set(
                &key,
                &StoredMediaFile {
                    record,
                    payload,
                    thumbnail,
                },
            )
            .await?;
        debug!(namespace = self.store.namespace(), key, "media file stored");
        Ok(())
    }

    async fn load(&self, scope: Option<&ProjectId>) -> CatalogResult<Vec<LoadedMediaFile>> {
        let prefix = Self::prefix(scope);
        let mut loaded = Vec::new();
        for key in self.store.list().await? {
            if !key.starts_with(&prefix) {
                continue;
            }
            let stored = match self.store.get(&key).await {
                Ok(Some(stored)) => stored,
                Ok(None) => continue,
                Err(StoreError::Serialization(e)) => {
                    warn!(key, error = %e, "skipping unreadable media file record");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let mut item = stored.record.into_item();
            let mut payloads = ItemPayloads::default();

            match (decode_or_warn(&key, stored.payload.as_ref()), &stored.payload) {
                (Some(p), Some(raw)) if raw.inline => item.url = InlineData::encode(&p.mime, &p.bytes),
                (media, _) => payloads.media = media,
            }
            match (decode_or_warn(&key, stored.thumbnail.as_ref()), &stored.thumbnail) {
                (Some(p), Some(raw)) if raw.inline => {
                    item.thumbnail_url = Some(InlineData::encode(&p.mime, &p.bytes))
                }
                (thumbnail, _) => payloads.thumbnail = thumbnail,
            }
            loaded.push(LoadedMediaFile { item, payloads });
        }
        Ok(loaded)
    }

    async fn delete(&self, scope: Option<&ProjectId>, id: &MediaId) -> CatalogResult<()> {
        self.store.remove(&Self::key(scope, id)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for KeyedMediaFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedMediaFileStore")
            .field("namespace", &self.store.namespace())
            .finish()
    }
}

/// Bytes to store for one reference: the in-memory payload if there is
/// one, else the decoded inline URL.
fn stored_payload(
    payload: Option<&MediaPayload>,
    url: Option<&str>,
) -> CatalogResult<Option<StoredPayload>> {
    if let Some(p) = payload {
        return Ok(Some(StoredPayload::encode(p)));
    }
    match url {
        Some(u) if MediaRef::classify(u).is_inline() => Ok(Some(StoredPayload::encode_inline(
            &MediaPayload::from_inline(u)?,
        ))),
        _ => Ok(None),
    }
}

fn decode_or_warn(key: &str, stored: Option<&StoredPayload>) -> Option<MediaPayload> {
    match stored?.decode() {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(key, error = %e, "dropping undecodable media payload");
            None
        }
    }
}
