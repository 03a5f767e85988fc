//! Extension discovery and load order
//!
//! Every subdirectory of `extensions/` is a mod. A mod may describe itself
//! in `content.xml`:
//!
//! ```xml
//! <content id="my_mod" name="My Mod" version="110" enabled="1">
//!   <dependency version="600" />
//!   <dependency id="ego_dlc_split" optional="true" />
//! </content>
//! ```
//!
//! The declared dependencies decide the load order: a dependency is loaded
//! before the mods that need it, and whatever loads later overrides what
//! loaded earlier. Mods that do not constrain each other load in ascending
//! directory-name order.

use crate::{CONTENT_FILE, CatalogError, Result, XmlDocument};
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Dependency declared in `content.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Id of the required extension
    pub id: String,
    /// Load even when the dependency is absent
    pub optional: bool,
}

/// Parsed `content.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionManifest {
    /// Extension id
    pub id: String,
    /// Display name
    pub name: Option<String>,
    /// Version string as written
    pub version: Option<String>,
    /// Whether the extension is switched on
    pub enabled: bool,
    /// Extensions that must load first
    pub dependencies: Vec<Dependency>,
}

impl ExtensionManifest {
    /// Parse a manifest document. `source` labels errors.
    pub fn parse<R: Read>(reader: R, source: &str) -> Result<Self> {
        let root = XmlDocument::parse(reader).map_err(|e| CatalogError::Xml {
            path: source.to_string(),
            source: e,
        })?;

        if root.name != "content" {
            return Err(CatalogError::Config(format!(
                "{source}: expected <content> root element, found <{}>",
                root.name
            )));
        }

        let id = root
            .attributes
            .get("id")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CatalogError::Config(format!("{source}: <content> has no id")))?;

        let enabled = root
            .attributes
            .get("enabled")
            .is_none_or(|value| parse_flag(value));

        let dependencies = root
            .children
            .iter()
            .filter_map(|node| node.as_element())
            .filter(|element| element.name == "dependency")
            .filter_map(|element| {
                // Dependencies without an id pin the base game version.
                let id = element.attributes.get("id")?.trim();
                (!id.is_empty()).then(|| Dependency {
                    id: id.to_string(),
                    optional: element
                        .attributes
                        .get("optional")
                        .is_some_and(|value| parse_flag(value)),
                })
            })
            .collect();

        Ok(Self {
            id,
            name: root.attributes.get("name").cloned(),
            version: root.attributes.get("version").cloned(),
            enabled,
            dependencies,
        })
    }

    /// Read and parse a manifest from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::parse(std::io::BufReader::new(file), &path.display().to_string())
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no")
}

/// An installed extension directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Id from the manifest, or the directory name
    pub id: String,
    /// Directory name under `extensions/`
    pub dir_name: String,
    /// Absolute directory path
    pub path: PathBuf,
    /// Manifest, when the directory has one
    pub manifest: Option<ExtensionManifest>,
}

impl Extension {
    /// Describe the extension in `path`, reading its manifest if present.
    ///
    /// A manifest that cannot be parsed is logged and the directory name is
    /// used as the id.
    pub fn from_dir(path: &Path) -> Result<Self> {
        let dir_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CatalogError::Config(format!("not an extension directory: {}", path.display()))
            })?;

        let manifest_path = path.join(CONTENT_FILE);
        let manifest = if manifest_path.is_file() {
            match ExtensionManifest::from_path(&manifest_path) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!("Ignoring unreadable manifest {}: {e}", manifest_path.display());
                    None
                }
            }
        } else {
            None
        };

        let id = manifest
            .as_ref()
            .map_or_else(|| dir_name.clone(), |m| m.id.clone());

        Ok(Self {
            id,
            dir_name,
            path: path.to_path_buf(),
            manifest,
        })
    }

    /// Whether the manifest switches the extension on (no manifest: on).
    pub fn is_enabled(&self) -> bool {
        self.manifest.as_ref().is_none_or(|m| m.enabled)
    }

    /// Declared dependencies.
    pub fn dependencies(&self) -> &[Dependency] {
        self.manifest
            .as_ref()
            .map_or(&[], |m| m.dependencies.as_slice())
    }
}

/// List the extensions under `extensions_path`, sorted by directory name.
///
/// A missing extensions directory yields an empty list.
pub fn discover(extensions_path: &Path, respect_disabled: bool) -> Result<Vec<Extension>> {
    let entries = match std::fs::read_dir(extensions_path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No extensions directory at {}", extensions_path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut extensions = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let extension = Extension::from_dir(&entry.path())?;
        if respect_disabled && !extension.is_enabled() {
            info!("Skipping disabled extension {}", extension.id);
            continue;
        }
        extensions.push(extension);
    }

    extensions.sort_by(|a, b| a.dir_name.cmp(&b.dir_name));
    Ok(extensions)
}

/// Order extensions so that dependencies come before their dependents.
///
/// The input order (directory name order from [`discover`]) breaks ties.
/// Missing dependencies are ignored; dependency cycles are broken by
/// falling back to input order for the extensions involved.
pub fn load_order(extensions: Vec<Extension>) -> Vec<Extension> {
    let count = extensions.len();
    let mut by_id: HashMap<&str, usize> = HashMap::with_capacity(count);
    for (index, extension) in extensions.iter().enumerate() {
        if let Some(previous) = by_id.insert(extension.id.as_str(), index) {
            warn!(
                "Extension id {} declared by both {} and {}",
                extension.id, extensions[previous].dir_name, extension.dir_name
            );
            by_id.insert(extensions[previous].id.as_str(), previous);
        }
    }

    let mut pending = vec![0usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (index, extension) in extensions.iter().enumerate() {
        for dependency in extension.dependencies() {
            match by_id.get(dependency.id.as_str()) {
                Some(&target) if target != index => {
                    pending[index] += 1;
                    dependents[target].push(index);
                }
                Some(_) => {}
                None if dependency.optional => {
                    debug!(
                        "{}: optional dependency {} not installed",
                        extension.id, dependency.id
                    );
                }
                None => {
                    warn!(
                        "{}: dependency {} not installed",
                        extension.id, dependency.id
                    );
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&i| pending[i] == 0).collect();
    let mut placed = vec![false; count];
    let mut order = Vec::with_capacity(count);

    while order.len() < count {
        let next = match ready.pop_first() {
            Some(next) => next,
            None => {
                let Some(stuck) = (0..count).find(|&i| !placed[i]) else {
                    break;
                };
                warn!(
                    "Dependency cycle involving extension {}, loading in name order",
                    extensions[stuck].id
                );
                stuck
            }
        };
        if placed[next] {
            continue;
        }

        placed[next] = true;
        order.push(next);
        for &dependent in &dependents[next] {
            pending[dependent] = pending[dependent].saturating_sub(1);
            if pending[dependent] == 0 && !placed[dependent] {
                ready.insert(dependent);
            }
        }
    }

    let mut slots: Vec<Option<Extension>> = extensions.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}
