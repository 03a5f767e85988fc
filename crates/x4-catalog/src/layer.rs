//! Layer model and priority ordering
//!
//! A layer is one source of files: a single catalog pair or a loose
//! directory. Its [`LayerKind`] fixes its priority through an explicit total
//! order, independent of how the filesystem happens to list directories:
//!
//! | kind                       | origin              | tier | ordinal |
//! |----------------------------|---------------------|------|---------|
//! | `Vanilla(n)`               | 0                   | 0    | n       |
//! | `LooseRoot`                | 0                   | 1    | 0       |
//! | `ExtensionArchive(ext, n)` | 1 + load position   | 0    | n       |
//! | `ExtensionLoose(ext)`      | 1 + load position   | 1    | 0       |
//!
//! Larger keys win. Every extension therefore outranks the base game, a
//! later-loaded extension outranks an earlier one, loose files outrank the
//! archives of the same origin, and higher-numbered archives outrank lower
//! ones.

use crate::archive::Archive;
use crate::path::LogicalPath;
use crate::stream::CatalogStream;
use crate::{CatalogError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

/// An extension's place in the load order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionSlot {
    /// Extension id
    pub id: String,
    /// Zero-based load position, later loads win
    pub position: usize,
}

/// What a layer is and where it comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// `NN.cat`/`NN.dat` in the installation root
    Vanilla(u32),
    /// Loose files in the installation root
    LooseRoot,
    /// `ext_NN.cat`/`ext_NN.dat` inside an extension
    ExtensionArchive(ExtensionSlot, u32),
    /// Loose files inside an extension
    ExtensionLoose(ExtensionSlot),
}

impl LayerKind {
    /// Priority key; larger wins.
    pub fn sort_key(&self) -> (usize, u8, u32) {
        match self {
            Self::Vanilla(n) => (0, 0, *n),
            Self::LooseRoot => (0, 1, 0),
            Self::ExtensionArchive(slot, n) => (slot.position + 1, 0, *n),
            Self::ExtensionLoose(slot) => (slot.position + 1, 1, 0),
        }
    }

    /// Loose directory rather than a catalog pair.
    pub const fn is_loose(&self) -> bool {
        matches!(self, Self::LooseRoot | Self::ExtensionLoose(_))
    }

    /// Contributed by an extension.
    pub const fn is_extension(&self) -> bool {
        matches!(self, Self::ExtensionArchive(..) | Self::ExtensionLoose(_))
    }

    /// Id of the contributing extension.
    pub fn extension_id(&self) -> Option<&str> {
        match self {
            Self::ExtensionArchive(slot, _) | Self::ExtensionLoose(slot) => Some(&slot.id),
            Self::Vanilla(_) | Self::LooseRoot => None,
        }
    }

    /// Load position of the contributing extension.
    pub const fn extension_position(&self) -> Option<usize> {
        match self {
            Self::ExtensionArchive(slot, _) | Self::ExtensionLoose(slot) => Some(slot.position),
            Self::Vanilla(_) | Self::LooseRoot => None,
        }
    }

    fn slot_id(&self) -> &str {
        self.extension_id().unwrap_or("")
    }
}

impl Ord for LayerKind {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.slot_id().cmp(other.slot_id()))
    }
}

impl PartialOrd for LayerKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vanilla(n) => write!(f, "vanilla {n:02}"),
            Self::LooseRoot => f.write_str("loose root"),
            Self::ExtensionArchive(slot, n) => write!(f, "extension {} ext_{n:02}", slot.id),
            Self::ExtensionLoose(slot) => write!(f, "extension {} loose", slot.id),
        }
    }
}

/// A loose directory taking part in resolution.
///
/// Top-level names in `excluded` (catalog files, the extensions directory,
/// the extension manifest) belong to the layer machinery, not to the
/// virtual filesystem, and are never served.
#[derive(Debug, Clone)]
pub struct LooseRoot {
    path: PathBuf,
    excluded: Vec<String>,
}

impl LooseRoot {
    /// Loose root at `path` hiding the given top-level names.
    pub fn new(path: impl Into<PathBuf>, excluded: impl IntoIterator<Item = String>) -> Self {
        Self {
            path: path.into(),
            excluded: excluded.into_iter().map(|n| n.to_lowercase()).collect(),
        }
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_excluded(&self, top_level: &str) -> bool {
        let lowered = top_level.to_lowercase();
        self.excluded.iter().any(|name| *name == lowered)
    }

    /// Filesystem location of `path`, if the directory holds it.
    pub fn locate(&self, path: &LogicalPath) -> Result<Option<PathBuf>> {
        if path.segments().next().is_some_and(|top| self.is_excluded(top)) {
            return Ok(None);
        }
        Ok(path.locate_in(&self.path)?)
    }

    /// Whether anything besides excluded names lives in the directory.
    pub fn has_content(&self) -> Result<bool> {
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if !self.is_excluded(&entry.file_name().to_string_lossy()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every file below the directory, as logical paths.
    ///
    /// Names that are not valid UTF-8 cannot be addressed and are skipped.
    pub fn files(&self) -> Result<Vec<LogicalPath>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.path)
            .min_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() != 1 || !self.is_excluded(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                CatalogError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::other(format!("walk failed below {}", self.path.display()))
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.path) else {
                continue;
            };
            let Some(relative) = relative.to_str() else {
                trace!("Skipping non UTF-8 path {}", entry.path().display());
                continue;
            };
            files.push(LogicalPath::parse(relative)?);
        }

        Ok(files)
    }
}

/// Backing storage of a layer.
#[derive(Debug)]
pub enum LayerSource {
    /// A catalog pair
    Archive(Archive),
    /// A loose directory
    Loose(LooseRoot),
}

/// One prioritized source of files.
#[derive(Debug)]
pub struct Layer {
    kind: LayerKind,
    source: LayerSource,
}

impl Layer {
    /// Layer backed by a catalog pair.
    pub const fn archive(kind: LayerKind, archive: Archive) -> Self {
        Self {
            kind,
            source: LayerSource::Archive(archive),
        }
    }

    /// Layer backed by a loose directory.
    pub const fn loose(kind: LayerKind, root: LooseRoot) -> Self {
        Self {
            kind,
            source: LayerSource::Loose(root),
        }
    }

    /// Kind and priority.
    pub const fn kind(&self) -> &LayerKind {
        &self.kind
    }

    /// Backing storage.
    pub const fn source(&self) -> &LayerSource {
        &self.source
    }

    /// Whether this layer holds `path`.
    pub fn contains(&self, path: &LogicalPath) -> Result<bool> {
        match &self.source {
            LayerSource::Archive(archive) => Ok(archive.contains(path)),
            LayerSource::Loose(root) => Ok(root.locate(path)?.is_some()),
        }
    }

    /// Open `path` from this layer, `Ok(None)` when the layer lacks it.
    pub fn open(&self, path: &LogicalPath) -> Result<Option<CatalogStream>> {
        match &self.source {
            LayerSource::Archive(archive) => Ok(archive
                .try_extract(path)
                .map(|reader| CatalogStream::packed(reader, self.kind.clone()))),
            LayerSource::Loose(root) => match root.locate(path)? {
                Some(file) => Ok(Some(CatalogStream::loose(&file, self.kind.clone())?)),
                None => Ok(None),
            },
        }
    }

    /// Every logical path this layer can serve.
    pub fn files(&self) -> Result<Vec<LogicalPath>> {
        match &self.source {
            LayerSource::Archive(archive) => {
                Ok(archive.entries().map(|entry| entry.path.clone()).collect())
            }
            LayerSource::Loose(root) => root.files(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn slot(id: &str, position: usize) -> ExtensionSlot {
        ExtensionSlot {
            id: id.to_string(),
            position,
        }
    }

    #[test]
    fn test_total_order() {
        let mut kinds = vec![
            LayerKind::ExtensionLoose(slot("b", 1)),
            LayerKind::Vanilla(9),
            LayerKind::ExtensionArchive(slot("a", 0), 1),
            LayerKind::LooseRoot,
            LayerKind::Vanilla(1),
            LayerKind::ExtensionArchive(slot("b", 1), 2),
            LayerKind::ExtensionLoose(slot("a", 0)),
            LayerKind::ExtensionArchive(slot("b", 1), 1),
        ];
        kinds.sort_by(|a, b| b.cmp(a));

        let names: Vec<String> = kinds.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "extension b loose",
                "extension b ext_02",
                "extension b ext_01",
                "extension a loose",
                "extension a ext_01",
                "loose root",
                "vanilla 09",
                "vanilla 01",
            ]
        );
    }

    #[test]
    fn test_extension_always_outranks_vanilla() {
        let low_ext = LayerKind::ExtensionArchive(slot("a", 0), 0);
        assert!(low_ext > LayerKind::Vanilla(u32::MAX));
        assert!(low_ext > LayerKind::LooseRoot);
    }

    #[test]
    fn test_kind_predicates() {
        assert!(LayerKind::LooseRoot.is_loose());
        assert!(!LayerKind::LooseRoot.is_extension());
        let ext = LayerKind::ExtensionArchive(slot("m", 0), 1);
        assert!(ext.is_extension());
        assert!(!ext.is_loose());
        assert_eq!(ext.extension_id(), Some("m"));
        assert_eq!(LayerKind::Vanilla(1).extension_id(), None);
    }

    #[test]
    fn test_loose_root_exclusions() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("extensions").join("m")).expect("mkdir");
        std::fs::create_dir_all(root.join("libraries")).expect("mkdir");
        std::fs::write(root.join("01.cat"), b"").expect("write");
        std::fs::write(root.join("extensions").join("m").join("x.txt"), b"x").expect("write");
        std::fs::write(root.join("libraries").join("a.xml"), b"<a/>").expect("write");
        std::fs::write(root.join("version.dat"), b"330").expect("write");

        let loose = LooseRoot::new(root, ["extensions".to_string(), "01.cat".to_string()]);
        let files = loose.files().expect("files");
        let mut keys: Vec<&str> = files.iter().map(LogicalPath::key).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["libraries/a.xml", "version.dat"]);

        let hidden = LogicalPath::parse("Extensions/m/x.txt").expect("path");
        assert_eq!(loose.locate(&hidden).expect("locate"), None);
        assert!(loose.has_content().expect("has_content"));

        let only_excluded = LooseRoot::new(root.join("extensions").join("m"), ["x.txt".to_string()]);
        assert!(!only_excluded.has_content().expect("has_content"));
    }

    #[test]
    fn test_loose_layer_open() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("file name.txt"), b"loose bytes").expect("write");
        let layer = Layer::loose(LayerKind::LooseRoot, LooseRoot::new(dir.path(), []));

        let path = LogicalPath::parse("FILE NAME.txt").expect("path");
        assert!(layer.contains(&path).expect("contains"));
        let stream = layer.open(&path).expect("open").expect("present");
        assert_eq!(stream.layer(), &LayerKind::LooseRoot);
        assert!(!stream.is_packed());
        assert_eq!(stream.into_bytes().expect("read"), b"loose bytes");

        let missing = LogicalPath::parse("missing.txt").expect("path");
        assert!(layer.open(&missing).expect("open").is_none());
    }
}
