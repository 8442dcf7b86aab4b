//! Filesystem-backed local saver for desktop builds.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use atelier_catalog::{LocalSaver, SaveError};
use atelier_types::{InlineData, MediaRef, SystemCategory, DURABLE_PREFIX};

use crate::error::{SdkError, SdkResult};

/// Writes inline assets to `<root>/<category>/<blake3 hex>-<filename>`.
///
/// Content-addressed names make repeated saves of the same bytes
/// idempotent. Sources that are not inline are returned unchanged.
#[derive(Clone, Debug)]
pub struct FsLocalSaver {
    root: PathBuf,
}

impl FsLocalSaver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path behind a durable reference.
    pub fn resolve(&self, reference: &str) -> SdkResult<PathBuf> {
        let relative = reference
            .strip_prefix(DURABLE_PREFIX)
            .ok_or_else(|| SdkError::NotDurable(reference.to_string()))?;
        let mut parts = relative.splitn(2, '/');
        match (parts.next(), parts.next()) {
            (Some(category), Some(file))
                if category.parse::<SystemCategory>().is_ok() && is_plain_name(file) =>
            {
                Ok(self.root.join(category).join(file))
            }
            _ => Err(SdkError::NotDurable(reference.to_string())),
        }
    }

    pub async fn read(&self, reference: &str) -> SdkResult<Vec<u8>> {
        Ok(tokio::fs::read(self.resolve(reference)?).await?)
    }
}

#[async_trait]
impl LocalSaver for FsLocalSaver {
    async fn save_locally(
        &self,
        source: &str,
        category: SystemCategory,
        filename: &str,
    ) -> Result<String, SaveError> {
        if !MediaRef::classify(source).is_inline() {
            return Ok(source.to_string());
        }
        let data = InlineData::decode(source).map_err(|e| SaveError::Source(e.to_string()))?;
        let digest = hex::encode(blake3::hash(&data.bytes).as_bytes());
        let file = format!("{digest}-{}", sanitize(filename));

        let dir = self.root.join(category.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&file);
        if !tokio::fs::try_exists(&path).await? {
            let partial = dir.join(format!("{file}.part"));
            tokio::fs::write(&partial, &data.bytes).await?;
            tokio::fs::rename(&partial, &path).await?;
            debug!(path = %path.display(), bytes = data.bytes.len(), "asset saved locally");
        }
        Ok(format!("{DURABLE_PREFIX}{category}/{file}"))
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Keep `[A-Za-z0-9._-]`, replace anything else.
fn sanitize(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "asset".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_source_is_written_under_category() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FsLocalSaver::new(dir.path());
        let source = InlineData::encode("image/png", b"PNGBYTES");

        let saved = saver
            .save_locally(&source, SystemCategory::AiImage, "m1.png")
            .await
            .unwrap();
        assert!(saved.starts_with("atelier-local://ai-image/"));
        assert!(saved.ends_with("-m1.png"));
        assert_eq!(saver.read(&saved).await.unwrap(), b"PNGBYTES");

        let again = saver
            .save_locally(&source, SystemCategory::AiImage, "m1.png")
            .await
            .unwrap();
        assert_eq!(again, saved);
    }

    #[tokio::test]
    async fn non_inline_sources_are_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FsLocalSaver::new(dir.path());
        for source in [
            "https://cdn.example/a.png",
            "blob:atelier/123",
            "atelier-local://upload/x.png",
        ] {
            let out = saver
                .save_locally(source, SystemCategory::Upload, "x.png")
                .await
                .unwrap();
            assert_eq!(out, source);
        }
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn malformed_inline_source_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FsLocalSaver::new(dir.path());
        let err = saver
            .save_locally("data:image/png;base64,@@@", SystemCategory::Upload, "x.png")
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::Source(_)));
    }

    #[test]
    fn hostile_names_stay_inside_root() {
        assert_eq!(sanitize("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize(""), "asset");
        let saver = FsLocalSaver::new("/data");
        assert!(saver.resolve("atelier-local://upload/../secret").is_err());
        assert!(saver.resolve("atelier-local://nope/file.png").is_err());
        assert!(saver.resolve("https://cdn.example/a.png").is_err());
        assert_eq!(
            saver.resolve("atelier-local://upload/a.png").unwrap(),
            PathBuf::from("/data/upload/a.png")
        );
    }
}
