//! Resolver facade
//!
//! [`CatalogResolver`] owns the layer stack and answers every lookup by
//! walking it from the highest priority layer down; the first layer holding
//! the path serves it.
//!
//! Paths of the form `extensions/<dir>/<rest>` address an extension's own
//! content. They are looked up as `<rest>` in that extension's layers first,
//! then through the full stack like any other path.

use crate::enumerate::{self, LayerStack};
use crate::extension::Extension;
use crate::index::{IndexEntry, IndexTable};
use crate::layer::{Layer, LayerKind};
use crate::path::LogicalPath;
use crate::stream::CatalogStream;
use crate::{CatalogConfig, CatalogError, Result, XmlDocument};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Compute-once slot for one merged index.
type IndexSlot = Arc<Mutex<Option<Arc<IndexTable>>>>;

/// Read-only virtual filesystem over an installation and its extensions.
///
/// Built once; later changes on disk are not picked up, create a new
/// resolver for that. All lookups take `&self` and the resolver is `Sync`,
/// so one instance can serve many threads.
pub struct CatalogResolver {
    config: CatalogConfig,
    /// Highest priority first
    layers: Vec<Layer>,
    /// Contributing extensions in load order
    extensions: Vec<Extension>,
    /// Lower-cased extension directory name -> positions in `layers`
    scopes: HashMap<String, Vec<usize>>,
    version: OnceLock<String>,
    /// Index path key -> merged table
    indices: DashMap<String, IndexSlot>,
}

impl CatalogResolver {
    /// Open the installation at `root` with default settings.
    ///
    /// # Errors
    ///
    /// Returns a structural error when a catalog pair is incomplete or its
    /// listing does not match its blob.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(CatalogConfig::new(root))
    }

    /// Open an installation with explicit settings.
    pub fn with_config(config: CatalogConfig) -> Result<Self> {
        let LayerStack { layers, extensions } = enumerate::enumerate(&config)?;
        let scopes = extension_scopes(&layers, &extensions);
        Ok(Self {
            config,
            layers,
            extensions,
            scopes,
            version: OnceLock::new(),
            indices: DashMap::new(),
        })
    }

    /// Settings this resolver was built with.
    pub const fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// The layer stack, highest priority first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Extensions taking part in resolution, in load order.
    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// Build identifier of the installation (e.g. `"330"`).
    ///
    /// Read from the version marker through the normal lookup and cached.
    pub fn version(&self) -> Result<&str> {
        if let Some(version) = self.version.get() {
            return Ok(version.as_str());
        }

        let text = self.read_to_string(&self.config.version_file)?;
        let version = text.trim_start_matches('\u{feff}').trim().to_string();
        Ok(self.version.get_or_init(|| version).as_str())
    }

    /// The layers of the extension `path` names, with `path` made relative
    /// to that extension.
    fn scoped(&self, path: &LogicalPath) -> Option<(impl Iterator<Item = &Layer>, LogicalPath)> {
        let (head, rest) = path.split_first()?;
        if !head.eq_ignore_ascii_case(&self.config.extensions_dir) {
            return None;
        }
        let (dir, inner) = rest.split_first()?;
        let positions = self.scopes.get(&dir.to_lowercase())?;
        let layers = positions.iter().filter_map(|&i| self.layers.get(i));
        Some((layers, inner))
    }

    fn search(&self, raw: &str) -> Result<CatalogStream> {
        let path = LogicalPath::parse(raw)?;
        if let Some((layers, inner)) = self.scoped(&path) {
            for layer in layers {
                if let Some(stream) = layer.open(&inner)? {
                    trace!("{} served from {} as {}", path, layer.kind(), inner);
                    return Ok(stream);
                }
            }
        }
        for layer in &self.layers {
            if let Some(stream) = layer.open(&path)? {
                trace!("{} served from {}", path, layer.kind());
                return Ok(stream);
            }
        }
        Err(CatalogError::not_found(raw))
    }

    /// Open a file.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] (carrying `path` as given) when no layer
    /// holds the file, [`CatalogError::InvalidPath`] for malformed input.
    pub fn open_file(&self, path: &str) -> Result<CatalogStream> {
        self.search(path)
    }

    /// Open a file, `Ok(None)` when no layer holds it.
    ///
    /// Only the not-found case is absorbed; invalid paths and I/O failures on
    /// a file that does exist are still returned as errors.
    pub fn try_open_file(&self, path: &str) -> Result<Option<CatalogStream>> {
        match self.search(path) {
            Ok(stream) => Ok(Some(stream)),
            Err(CatalogError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether any layer holds `path`.
    pub fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.locate(path)?.is_some())
    }

    /// The layer that would serve `path`.
    pub fn locate(&self, path: &str) -> Result<Option<&LayerKind>> {
        let path = LogicalPath::parse(path)?;
        if let Some((layers, inner)) = self.scoped(&path) {
            for layer in layers {
                if layer.contains(&inner)? {
                    return Ok(Some(layer.kind()));
                }
            }
        }
        for layer in &self.layers {
            if layer.contains(&path)? {
                return Ok(Some(layer.kind()));
            }
        }
        Ok(None)
    }

    /// Read a whole file.
    pub fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        Ok(self.open_file(path)?.into_bytes()?)
    }

    /// Read a whole file as UTF-8 text.
    pub fn read_to_string(&self, path: &str) -> Result<String> {
        let mut text = String::new();
        self.open_file(path)?.read_to_string(&mut text)?;
        Ok(text)
    }

    /// Open a file and parse it as XML.
    pub fn open_xml(&self, path: &str) -> Result<XmlDocument> {
        let stream = self.open_file(path)?;
        parse_xml(stream, path)
    }

    /// Every logical path visible through the stack, sorted by key.
    ///
    /// With `prefix`, only paths inside that directory are returned. Each
    /// path is reported once, spelled as in the layer that serves it.
    pub fn list_files(&self, prefix: Option<&str>) -> Result<Vec<LogicalPath>> {
        let prefix = prefix.map(LogicalPath::parse).transpose()?;
        let mut seen: BTreeMap<String, LogicalPath> = BTreeMap::new();

        for layer in &self.layers {
            for path in layer.files()? {
                if prefix.as_ref().is_some_and(|p| !path.starts_with(p)) {
                    continue;
                }
                seen.entry(path.key().to_string()).or_insert(path);
            }
        }

        Ok(seen.into_values().collect())
    }

    /// The merged table for an index file, built on first use.
    ///
    /// Concurrent first callers for the same index wait for a single merge.
    /// A failed merge is not cached.
    pub fn index_table(&self, index_path: &str) -> Result<Arc<IndexTable>> {
        let path = LogicalPath::parse(index_path)?;
        let slot = Arc::clone(&self.indices.entry(path.key().to_string()).or_default());

        let mut cached = slot.lock();
        if let Some(table) = cached.as_ref() {
            return Ok(Arc::clone(table));
        }

        debug!("Merging index {path} across {} layers", self.layers.len());
        let table = Arc::new(IndexTable::merge(self.layers.iter(), &path)?);
        *cached = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Look up one key of an index file.
    pub fn index_entry(&self, index_path: &str, key: &str) -> Result<Option<IndexEntry>> {
        Ok(self.index_table(index_path)?.get(key).cloned())
    }

    /// Resolve `key` through the merged index and load its target as XML.
    ///
    /// # Errors
    ///
    /// [`CatalogError::IndexKeyNotFound`] when no layer declares `key`;
    /// [`CatalogError::NotFound`] when the key's target file is missing.
    pub fn open_index_xml(&self, index_path: &str, key: &str) -> Result<XmlDocument> {
        let table = self.index_table(index_path)?;
        let entry = table
            .get(key)
            .ok_or_else(|| CatalogError::IndexKeyNotFound {
                index: index_path.to_string(),
                key: key.to_string(),
            })?;

        trace!("{key} -> {} via {}", entry.target, entry.layer);
        self.open_xml(entry.target.as_str())
    }
}

impl std::fmt::Debug for CatalogResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogResolver")
            .field("root", &self.config.root)
            .field("layers", &self.layers.len())
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}

fn extension_scopes(layers: &[Layer], extensions: &[Extension]) -> HashMap<String, Vec<usize>> {
    extensions
        .iter()
        .enumerate()
        .map(|(load_position, extension)| {
            let owned = layers
                .iter()
                .enumerate()
                .filter(|(_, layer)| layer.kind().extension_position() == Some(load_position))
                .map(|(i, _)| i)
                .collect();
            (extension.dir_name.to_lowercase(), owned)
        })
        .collect()
}

/// Parse an XML document from any reader; `label` names it in errors.
pub(crate) fn parse_xml<R: Read>(reader: R, label: &str) -> Result<XmlDocument> {
    XmlDocument::parse(BufReader::new(reader)).map_err(|e| CatalogError::Xml {
        path: label.to_string(),
        source: e,
    })
}
