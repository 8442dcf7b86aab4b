use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SdkResult;

/// Settings for an embedded catalog. Every key is optional in TOML.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtelierConfig {
    /// Root for the database and saved assets.
    pub data_dir: PathBuf,
    /// SQLite file, relative to `data_dir`.
    pub database_file: String,
    /// Logical collection; prefixes the store namespaces.
    pub collection: String,
    /// Saved assets directory, relative to `data_dir`.
    pub assets_dir: String,
    /// `false` keeps everything in memory.
    pub persist_catalog: bool,
}

impl Default for AtelierConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            database_file: "catalog.db".into(),
            collection: "media-library".into(),
            assets_dir: "assets".into(),
            persist_catalog: true,
        }
    }
}

impl AtelierConfig {
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn assets_path(&self) -> PathBuf {
        self.data_dir.join(&self.assets_dir)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::SdkError;

    #[test]
    fn default_config() {
        let c = AtelierConfig::default();
        assert_eq!(c.database_file, "catalog.db");
        assert_eq!(c.collection, "media-library");
        assert_eq!(c.assets_path(), PathBuf::from("./assets"));
        assert!(c.persist_catalog);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = AtelierConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/atelier"
            persist_catalog = false
            "#,
        )
        .unwrap();
        assert_eq!(c.database_path(), PathBuf::from("/var/lib/atelier/catalog.db"));
        assert_eq!(c.collection, "media-library");
        assert!(!c.persist_catalog);
    }

    #[test]
    fn ill_typed_toml_is_rejected() {
        let err = AtelierConfig::from_toml_str("persist_catalog = \"yes\"").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "collection = \"studio\"").unwrap();
        let c = AtelierConfig::load(file.path()).unwrap();
        assert_eq!(c.collection, "studio");

        assert!(matches!(
            AtelierConfig::load(file.path().with_extension("missing")),
            Err(SdkError::Io(_))
        ));
    }
}
