use bytes::Bytes;

use atelier_types::{InlineData, MediaKind, TypeError};

/// Raw asset bytes plus their MIME type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaPayload {
    pub bytes: Bytes,
    pub mime: String,
}

impl MediaPayload {
    pub fn new(bytes: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }

    /// Decode the bytes embedded in an inline (`data:`) reference.
    pub fn from_inline(url: &str) -> Result<Self, TypeError> {
        let data = InlineData::decode(url)?;
        Ok(Self::new(data.bytes, data.mime))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension for this payload, falling back to the media kind's.
    pub fn extension(&self, kind: MediaKind) -> &'static str {
        atelier_types::extension_for_mime(&self.mime).unwrap_or(kind.default_extension())
    }
}
