use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::{FolderId, ProjectId};
use crate::media::MediaSource;

/// Name of the pre-category folder that older builds created for generated
/// images. It is promoted in place to the `ai-image` system folder.
pub const LEGACY_AI_FOLDER_NAME: &str = "AI Generated";

/// The fixed set of categories that each own exactly one system folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemCategory {
    AiImage,
    AiVideo,
    Upload,
}

impl SystemCategory {
    /// Every category, in the order system folders are created.
    pub const ALL: [SystemCategory; 3] = [Self::AiImage, Self::AiVideo, Self::Upload];

    /// Fixed display name of the category's system folder.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::AiImage => "AI Images",
            Self::AiVideo => "AI Videos",
            Self::Upload => "Uploads",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiImage => "ai-image",
            Self::AiVideo => "ai-video",
            Self::Upload => "upload",
        }
    }

    /// Storage category for an asset, used as the local-save target hint.
    pub fn for_source(source: MediaSource) -> Self {
        match source {
            MediaSource::AiImage => Self::AiImage,
            MediaSource::AiVideo => Self::AiVideo,
            MediaSource::Upload => Self::Upload,
        }
    }
}

impl fmt::Display for SystemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemCategory {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai-image" => Ok(Self::AiImage),
            "ai-video" => Ok(Self::AiVideo),
            "upload" => Ok(Self::Upload),
            other => Err(TypeError::UnknownCategory(other.to_string())),
        }
    }
}

/// A node in the folder forest. `parent_id == None` marks a root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub parent_id: Option<FolderId>,
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_auto_created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<SystemCategory>,
    /// Creation time, Unix milliseconds.
    pub created_at: i64,
}

impl Folder {
    /// A user folder. It is auto-created iff a project is supplied.
    pub fn user(
        name: impl Into<String>,
        parent_id: Option<FolderId>,
        project_id: Option<ProjectId>,
    ) -> Self {
        let is_auto_created = project_id.is_some();
        Self {
            id: FolderId::generate(),
            name: name.into(),
            parent_id,
            project_id,
            is_system: false,
            is_auto_created,
            category: None,
            created_at: crate::now_millis(),
        }
    }

    /// The root system folder for `category`.
    pub fn system(category: SystemCategory) -> Self {
        Self {
            id: FolderId::generate(),
            name: category.display_name().to_string(),
            parent_id: None,
            project_id: None,
            is_system: true,
            is_auto_created: false,
            category: Some(category),
            created_at: crate::now_millis(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether this is a user-created root folder carrying the legacy label.
    pub fn is_legacy_ai_folder(&self) -> bool {
        !self.is_system && self.is_root() && self.name == LEGACY_AI_FOLDER_NAME
    }
}
