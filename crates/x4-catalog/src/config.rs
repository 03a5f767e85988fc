//! Configuration for the catalog resolver

use crate::{CatalogError, EXTENSIONS_DIR, Result, VERSION_FILE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the catalog resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Installation root (the directory holding `01.cat`)
    pub root: PathBuf,

    /// Stack installed extensions on top of the base game
    pub load_extensions: bool,

    /// Extensions directory name, relative to `root`
    pub extensions_dir: String,

    /// Skip extensions whose `content.xml` says `enabled="0"`
    pub respect_disabled: bool,

    /// Logical path of the version marker
    pub version_file: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            load_extensions: true,
            extensions_dir: EXTENSIONS_DIR.to_string(),
            respect_disabled: true,
            version_file: VERSION_FILE.to_string(),
        }
    }
}

impl CatalogConfig {
    /// Create a new configuration for the installation at `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            CatalogError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Set the installation root
    #[must_use]
    pub fn with_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.root = root.as_ref().to_path_buf();
        self
    }

    /// Enable or disable extension loading
    #[must_use]
    pub const fn with_extensions(mut self, enable: bool) -> Self {
        self.load_extensions = enable;
        self
    }

    /// Honour or ignore the `enabled` flag of extension manifests
    #[must_use]
    pub const fn with_respect_disabled(mut self, respect: bool) -> Self {
        self.respect_disabled = respect;
        self
    }

    /// Set the version marker path
    #[must_use]
    pub fn with_version_file(mut self, path: impl Into<String>) -> Self {
        self.version_file = path.into();
        self
    }

    /// Absolute path of the extensions directory
    pub fn extensions_path(&self) -> PathBuf {
        self.root.join(&self.extensions_dir)
    }

    /// Check the configuration before any directory is scanned.
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(CatalogError::Config(format!(
                "installation root is not a directory: {}",
                self.root.display()
            )));
        }

        if self.extensions_dir.is_empty() {
            return Err(CatalogError::Config(
                "extensions directory name must not be empty".to_string(),
            ));
        }

        if self.version_file.trim().is_empty() {
            return Err(CatalogError::Config(
                "version file path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = CatalogConfig::new("/games/x4");
        assert_eq!(config.root, PathBuf::from("/games/x4"));
        assert!(config.load_extensions);
        assert!(config.respect_disabled);
        assert_eq!(config.version_file, "version.dat");
        assert_eq!(
            config.extensions_path(),
            PathBuf::from("/games/x4/extensions")
        );
    }

    #[test]
    fn test_builder() {
        let config = CatalogConfig::default()
            .with_root("/a")
            .with_extensions(false)
            .with_respect_disabled(false)
            .with_version_file("build.txt");
        assert_eq!(config.root, PathBuf::from("/a"));
        assert!(!config.load_extensions);
        assert!(!config.respect_disabled);
        assert_eq!(config.version_file, "build.txt");
    }

    #[test]
    fn test_from_json_partial() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"{ "root": "/games/x4", "load_extensions": false }"#)
            .expect("write config");

        let config = CatalogConfig::from_json_file(&path).expect("parse config");
        assert_eq!(config.root, PathBuf::from("/games/x4"));
        assert!(!config.load_extensions);
        assert_eq!(config.extensions_dir, "extensions");
    }

    #[test]
    fn test_from_json_invalid() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "{ not json").expect("write config");

        let err = CatalogConfig::from_json_file(&path).expect_err("should fail");
        assert!(matches!(err, CatalogError::Config(_)));
    }

    #[test]
    fn test_validate_missing_root() {
        let dir = tempdir().expect("tempdir");
        let config = CatalogConfig::new(dir.path().join("missing"));
        assert!(config.validate().is_err());

        let config = CatalogConfig::new(dir.path());
        assert!(config.validate().is_ok());
    }
}
