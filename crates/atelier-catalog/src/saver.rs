use async_trait::async_trait;

use atelier_types::{MediaRef, SystemCategory};

use crate::error::SaveError;

/// Platform capability that moves asset bytes into durable local storage.
///
/// Implementations return either the source unchanged (saving is not
/// applicable or not available) or a new reference starting with
/// [`DURABLE_PREFIX`](atelier_types::DURABLE_PREFIX).
#[async_trait]
pub trait LocalSaver: Send + Sync {
    async fn save_locally(
        &self,
        source: &str,
        category: SystemCategory,
        filename: &str,
    ) -> Result<String, SaveError>;
}

/// Saver for builds without local storage: every source comes back
/// unchanged, which the catalog reads as "no migration occurred".
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughSaver;

#[async_trait]
impl LocalSaver for PassthroughSaver {
    async fn save_locally(
        &self,
        source: &str,
        _category: SystemCategory,
        _filename: &str,
    ) -> Result<String, SaveError> {
        Ok(source.to_string())
    }
}

/// Interpret a saver result: `Some(new)` only when the save produced a new
/// durable reference.
pub fn migrated_reference(source: &str, saved: String) -> Option<String> {
    (saved != source && MediaRef::classify(&saved).is_durable()).then_some(saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_returns_source() {
        let saver = PassthroughSaver;
        let out = saver
            .save_locally("data:image/png;base64,AA==", SystemCategory::Upload, "a.png")
            .await
            .unwrap();
        assert_eq!(out, "data:image/png;base64,AA==");
        assert_eq!(migrated_reference("data:image/png;base64,AA==", out), None);
    }

    #[test]
    fn only_prefixed_results_count_as_migrated() {
        assert_eq!(
            migrated_reference("https://x/a.png", "atelier-local://upload/a.png".into()),
            Some("atelier-local://upload/a.png".to_string())
        );
        assert_eq!(migrated_reference("https://x/a.png", "https://y/a.png".into()), None);
    }
}
