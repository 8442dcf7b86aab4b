//! Transient in-process references to binary data.
//!
//! A transient reference (`blob:atelier/<uuid>`) names bytes held by the
//! registry for the lifetime of the process. Each one must be released
//! exactly once; releasing twice or resolving after release is reported
//! rather than silently tolerated.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::warn;

use crate::payload::MediaPayload;

const TRANSIENT_SCHEME: &str = "blob:atelier/";

/// Registry of transient references.
pub trait TransientRefs: Send + Sync {
    /// Register `payload` and return a fresh transient reference to it.
    fn create(&self, payload: MediaPayload) -> String;

    /// The payload behind a live reference.
    fn resolve(&self, url: &str) -> Option<MediaPayload>;

    /// Release a reference. Returns `false` if it was not live.
    fn release(&self, url: &str) -> bool;

    /// Number of live references.
    fn live_count(&self) -> usize;
}

/// In-process [`TransientRefs`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct BlobUrlRegistry {
    live: Mutex<HashMap<String, MediaPayload>>,
}

impl BlobUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self) -> std::sync::MutexGuard<'_, HashMap<String, MediaPayload>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TransientRefs for BlobUrlRegistry {
    fn create(&self, payload: MediaPayload) -> String {
        let url = format!("{TRANSIENT_SCHEME}{}", uuid::Uuid::now_v7());
        self.live().insert(url.clone(), payload);
        url
    }

    fn resolve(&self, url: &str) -> Option<MediaPayload> {
        let payload = self.live().get(url).cloned();
        if payload.is_none() && url.starts_with(TRANSIENT_SCHEME) {
            warn!(url, "resolve of released or unknown transient reference");
        }
        payload
    }

    fn release(&self, url: &str) -> bool {
        let released = self.live().remove(url).is_some();
        if !released {
            warn!(url, "transient reference released twice or never created");
        }
        released
    }

    fn live_count(&self) -> usize {
        self.live().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_types::MediaRef;

    fn payload() -> MediaPayload {
        MediaPayload::new(vec![0xde, 0xad], "image/png")
    }

    #[test]
    fn create_resolve_release() {
        let registry = BlobUrlRegistry::new();
        let url = registry.create(payload());
        assert!(MediaRef::classify(&url).is_transient());
        assert_eq!(registry.resolve(&url), Some(payload()));
        assert_eq!(registry.live_count(), 1);

        assert!(registry.release(&url));
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.resolve(&url), None);
    }

    #[test]
    fn double_release_is_reported() {
        let registry = BlobUrlRegistry::new();
        let url = registry.create(payload());
        assert!(registry.release(&url));
        assert!(!registry.release(&url));
    }

    #[test]
    fn references_are_unique() {
        let registry = BlobUrlRegistry::new();
        let a = registry.create(payload());
        let b = registry.create(payload());
        assert_ne!(a, b);
        assert_eq!(registry.live_count(), 2);
    }
}
