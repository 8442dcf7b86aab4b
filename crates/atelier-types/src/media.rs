use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::{FolderId, MediaId, ProjectId};
use crate::reference::MediaRef;

/// The kind of asset a [`MediaItem`] holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Images and videos can be materialized to durable storage and carry
    /// thumbnails; audio cannot.
    pub fn is_visual(&self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }

    /// File extension used when no MIME type is known.
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Image => "png",
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(TypeError::UnknownMediaKind(other.to_string())),
        }
    }
}

/// Where an asset came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaSource {
    #[default]
    Upload,
    AiImage,
    AiVideo,
}

impl MediaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::AiImage => "ai-image",
            Self::AiVideo => "ai-video",
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaSource {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "ai-image" => Ok(Self::AiImage),
            "ai-video" => Ok(Self::AiVideo),
            other => Err(TypeError::UnknownMediaSource(other.to_string())),
        }
    }
}

/// A single media asset in the catalog.
///
/// `url` and `thumbnail_url` may hold a transient in-process reference
/// (never persisted) or a durable external reference (persisted). See
/// [`MediaRef`] for the classification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: MediaId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Duration in seconds (audio/video).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub folder_id: Option<FolderId>,
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub source: MediaSource,
    /// Ephemeral items live only in memory and are never persisted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ephemeral: bool,
}

impl MediaItem {
    pub fn url_ref(&self) -> MediaRef {
        MediaRef::classify(&self.url)
    }

    pub fn thumbnail_ref(&self) -> Option<MediaRef> {
        self.thumbnail_url.as_deref().map(MediaRef::classify)
    }

    /// Whether either reference still embeds the asset bytes inline.
    pub fn has_inline_reference(&self) -> bool {
        self.url_ref().is_inline()
            || self.thumbnail_ref().is_some_and(|r| r.is_inline())
    }

    /// Transient references held by this item, in release order.
    pub fn transient_urls(&self) -> Vec<&str> {
        let mut urls = Vec::new();
        if self.url_ref().is_transient() {
            urls.push(self.url.as_str());
        }
        if let Some(thumb) = self.thumbnail_url.as_deref() {
            if MediaRef::classify(thumb).is_transient() && thumb != self.url {
                urls.push(thumb);
            }
        }
        urls
    }
}
