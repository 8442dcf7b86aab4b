//! Classification of the URL-like strings that point at asset bytes.
//!
//! | Class       | Recognized by            | Persisted? |
//! |-------------|--------------------------|------------|
//! | `Transient` | `blob:`                  | never      |
//! | `Inline`    | `data:`                  | never      |
//! | `Durable`   | [`DURABLE_PREFIX`]       | yes        |
//! | `Remote`    | `http://`, `https://`    | yes        |
//! | `Other`     | anything else            | yes        |

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use crate::error::TypeError;

/// Prefix of the stable local references produced by the local-save
/// collaborator.
pub const DURABLE_PREFIX: &str = "atelier-local://";

const TRANSIENT_PREFIX: &str = "blob:";
const INLINE_PREFIX: &str = "data:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaRef {
    /// Process-lifetime handle to in-memory bytes. Must be released.
    Transient,
    /// Self-contained reference embedding the bytes.
    Inline,
    /// Stable pointer into local asset storage.
    Durable,
    /// Externally fetchable URL.
    Remote,
    Other,
}

impl MediaRef {
    pub fn classify(url: &str) -> Self {
        if url.starts_with(TRANSIENT_PREFIX) {
            Self::Transient
        } else if url.starts_with(INLINE_PREFIX) {
            Self::Inline
        } else if url.starts_with(DURABLE_PREFIX) {
            Self::Durable
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Self::Remote
        } else {
            Self::Other
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline)
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable)
    }

    /// Safe to write to persistent storage.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, Self::Transient | Self::Inline)
    }

    /// Candidate for materialization into durable local storage.
    pub fn is_materializable(&self) -> bool {
        matches!(self, Self::Inline | Self::Remote)
    }
}

/// The decoded contents of an inline (`data:`) reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineData {
    /// MIME type; `text/plain` when the reference omits one.
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl InlineData {
    /// Decode a `data:[<mime>][;base64],<payload>` reference.
    pub fn decode(url: &str) -> Result<Self, TypeError> {
        let rest = url.strip_prefix(INLINE_PREFIX).ok_or(TypeError::NotInline)?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| TypeError::MalformedInline("missing ',' separator".into()))?;

        let mut params = header.split(';');
        let mime = match params.next() {
            Some(m) if !m.is_empty() => m.to_ascii_lowercase(),
            _ => "text/plain".to_string(),
        };
        let is_base64 = params.any(|p| p.eq_ignore_ascii_case("base64"));

        let bytes = if is_base64 {
            B64.decode(payload.trim())
                .map_err(|e| TypeError::MalformedInline(e.to_string()))?
        } else {
            urlencoding::decode_binary(payload.as_bytes()).into_owned()
        };

        Ok(Self { mime, bytes })
    }

    /// Encode bytes as a base64 `data:` reference.
    pub fn encode(mime: &str, bytes: &[u8]) -> String {
        format!("{INLINE_PREFIX}{mime};base64,{}", B64.encode(bytes))
    }

    /// File extension implied by the MIME type, if it is a known media type.
    pub fn extension(&self) -> Option<&'static str> {
        extension_for_mime(&self.mime)
    }
}

/// File extension for common image/video/audio MIME types.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let ext = match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/webm" => "weba",
        _ => return None,
    };
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefixes() {
        assert_eq!(MediaRef::classify("blob:atelier/1"), MediaRef::Transient);
        assert_eq!(MediaRef::classify("data:image/png;base64,AA=="), MediaRef::Inline);
        assert_eq!(
            MediaRef::classify("atelier-local://ai-image/x.png"),
            MediaRef::Durable
        );
        assert_eq!(MediaRef::classify("https://cdn.example/x.png"), MediaRef::Remote);
        assert_eq!(MediaRef::classify(""), MediaRef::Other);
    }

    #[test]
    fn persistable_excludes_transient_and_inline() {
        assert!(!MediaRef::Transient.is_persistable());
        assert!(!MediaRef::Inline.is_persistable());
        assert!(MediaRef::Durable.is_persistable());
        assert!(MediaRef::Remote.is_persistable());
    }

    #[test]
    fn decode_base64_inline() {
        let url = InlineData::encode("image/png", b"\x89PNG");
        let data = InlineData::decode(&url).unwrap();
        assert_eq!(data.mime, "image/png");
        assert_eq!(data.bytes, b"\x89PNG");
        assert_eq!(data.extension(), Some("png"));
    }

    #[test]
    fn decode_percent_encoded_inline() {
        let data = InlineData::decode("data:,hello%20world").unwrap();
        assert_eq!(data.mime, "text/plain");
        assert_eq!(data.bytes, b"hello world");
        assert_eq!(data.extension(), None);
    }

    #[test]
    fn decode_rejects_malformed() {
        assert_eq!(
            InlineData::decode("https://x"),
            Err(TypeError::NotInline)
        );
        assert!(InlineData::decode("data:image/png;base64").is_err());
        assert!(InlineData::decode("data:image/png;base64,!!!").is_err());
    }

    #[test]
    fn stray_percent_is_kept_literally() {
        let data = InlineData::decode("data:,50%25%zz").unwrap();
        assert_eq!(data.bytes, b"50%%zz");
    }
}
