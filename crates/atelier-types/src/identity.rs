use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered identifier (UUID v7).
            pub fn generate() -> Self {
                Self(uuid::Uuid::now_v7().to_string())
            }

            /// Wrap an existing identifier string (e.g. one read from storage).
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Short representation (first 8 characters).
            pub fn short_id(&self) -> &str {
                let end = self
                    .0
                    .char_indices()
                    .nth(8)
                    .map(|(i, _)| i)
                    .unwrap_or(self.0.len());
                &self.0[..end]
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Globally unique, immutable identifier of a [`MediaItem`](crate::MediaItem).
    MediaId
);

string_id!(
    /// Identifier of a [`Folder`](crate::Folder).
    FolderId
);

string_id!(
    /// Identifier of the editing project an entity is scoped to.
    ProjectId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = MediaId::generate();
        let b = MediaId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn legacy_ids_are_preserved_verbatim() {
        let id = FolderId::new("folder-1712345678901");
        assert_eq!(id.as_str(), "folder-1712345678901");
        assert_eq!(id.to_string(), "folder-1712345678901");
    }

    #[test]
    fn short_id_handles_short_strings() {
        assert_eq!(ProjectId::new("p1").short_id(), "p1");
        assert_eq!(ProjectId::new("0123456789").short_id(), "01234567");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = MediaId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let back: MediaId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn debug_uses_type_name() {
        let debug = format!("{:?}", FolderId::new("f1"));
        assert_eq!(debug, "FolderId(f1)");
    }
}
