//! Layer discovery
//!
//! Builds the layer stack of an installation once, at resolver construction:
//!
//! 1. `<root>/NN.cat` + `NN.dat` pairs become `Vanilla(NN)` layers
//! 2. `<root>` itself becomes the `LooseRoot` layer
//! 3. each extension, in load order, contributes its `ext_NN` pairs and its
//!    own directory as a loose layer
//!
//! The result is sorted by [`LayerKind`] priority, highest first.

use crate::archive::Archive;
use crate::extension::{self, Extension};
use crate::layer::{ExtensionSlot, Layer, LayerKind, LooseRoot};
use crate::{CAT_EXTENSION, CONTENT_FILE, CatalogConfig, CatalogError, DAT_EXTENSION};
use crate::{EXTENSION_ARCHIVE_PREFIX, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A catalog pair found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPair {
    /// Numeric part of the file stem
    pub ordinal: u32,
    /// `.cat` listing
    pub listing: PathBuf,
    /// `.dat` blob
    pub blob: PathBuf,
}

/// The ordered layers of an installation plus the extensions they came from.
#[derive(Debug)]
pub struct LayerStack {
    /// Highest priority first
    pub layers: Vec<Layer>,
    /// Contributing extensions, in load order
    pub extensions: Vec<Extension>,
}

/// Find the catalog pairs named `<prefix><digits>.cat/.dat` directly in `dir`.
///
/// Pairs are returned in ascending ordinal order. A listing without a blob,
/// or a blob without a listing, is a structural error.
pub fn catalog_pairs(dir: &Path, prefix: &str) -> Result<Vec<CatalogPair>> {
    let mut halves: BTreeMap<String, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        let (Some(stem), Some(extension)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        if ordinal_of(stem, prefix).is_none() {
            continue;
        }

        let slot = halves.entry(stem.to_lowercase()).or_default();
        if extension.eq_ignore_ascii_case(CAT_EXTENSION) {
            slot.0 = Some(path);
        } else if extension.eq_ignore_ascii_case(DAT_EXTENSION) {
            slot.1 = Some(path);
        }
    }

    let mut pairs: Vec<CatalogPair> = Vec::with_capacity(halves.len());
    for (stem, halves) in halves {
        let (listing, blob) = match halves {
            (Some(listing), Some(blob)) => (listing, blob),
            (Some(path), None) | (None, Some(path)) => {
                return Err(CatalogError::MissingPair { path });
            }
            (None, None) => continue,
        };

        let Some(ordinal) = ordinal_of(&stem, prefix) else {
            continue;
        };
        if let Some(clash) = pairs.iter().find(|p| p.ordinal == ordinal) {
            return Err(CatalogError::integrity(
                &listing,
                format!(
                    "catalog ordinal {ordinal} is also used by {}",
                    clash.listing.display()
                ),
            ));
        }

        pairs.push(CatalogPair {
            ordinal,
            listing,
            blob,
        });
    }

    pairs.sort_by_key(|pair| pair.ordinal);
    Ok(pairs)
}

/// `Some(n)` when `stem` is `prefix` followed by decimal digits only.
fn ordinal_of(stem: &str, prefix: &str) -> Option<u32> {
    let digits = if prefix.is_empty() {
        stem
    } else {
        let head = stem.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }
        &stem[prefix.len()..]
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Names of every top-level `.cat` listing in `dir` and its `.dat` partner.
///
/// Covers pairs that do not take part in resolution (`01_sig.cat`,
/// `subst_01.cat`) so they are not served as loose files either.
fn catalog_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let (Some(stem), Some(extension)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        if extension.eq_ignore_ascii_case(CAT_EXTENSION) {
            names.push(format!("{stem}.{extension}"));
            names.push(format!("{stem}.{DAT_EXTENSION}"));
        }
    }
    Ok(names)
}

/// Discover and open every layer of the installation described by `config`.
pub fn enumerate(config: &CatalogConfig) -> Result<LayerStack> {
    config.validate()?;
    let root = &config.root;
    info!("Enumerating catalog layers in {}", root.display());

    let mut layers = Vec::new();

    let pairs = catalog_pairs(root, "")?;
    for pair in &pairs {
        let archive = Archive::open(&pair.listing, &pair.blob)?;
        layers.push(Layer::archive(LayerKind::Vanilla(pair.ordinal), archive));
    }
    let mut hidden = catalog_file_names(root)?;
    hidden.push(config.extensions_dir.clone());
    layers.push(Layer::loose(LayerKind::LooseRoot, LooseRoot::new(root, hidden)));

    let mut contributing = Vec::new();
    if config.load_extensions {
        let discovered = extension::discover(&config.extensions_path(), config.respect_disabled)?;
        for extension in extension::load_order(discovered) {
            // positions count contributing extensions only, so `extensions[i]`
            // owns the layers whose slot sits at position `i`
            let position = contributing.len();
            let slot = ExtensionSlot {
                id: extension.id.clone(),
                position,
            };
            let mod_layers = extension_layers(&extension, &slot)?;
            if mod_layers.is_empty() {
                debug!("Extension {} has no content, skipping", extension.id);
                continue;
            }
            debug!(
                "Extension {} loads at position {position} with {} layers",
                extension.id,
                mod_layers.len()
            );
            layers.extend(mod_layers);
            contributing.push(extension);
        }
    }

    layers.sort_by(|a, b| b.kind().cmp(a.kind()));
    info!(
        "Catalog stack ready: {} layers, {} extensions",
        layers.len(),
        contributing.len()
    );

    Ok(LayerStack {
        layers,
        extensions: contributing,
    })
}

fn extension_layers(extension: &Extension, slot: &ExtensionSlot) -> Result<Vec<Layer>> {
    let pairs = catalog_pairs(&extension.path, EXTENSION_ARCHIVE_PREFIX)?;
    let mut layers = Vec::with_capacity(pairs.len() + 1);

    for pair in &pairs {
        let archive = Archive::open(&pair.listing, &pair.blob)?;
        layers.push(Layer::archive(
            LayerKind::ExtensionArchive(slot.clone(), pair.ordinal),
            archive,
        ));
    }

    let mut hidden = catalog_file_names(&extension.path)?;
    hidden.push(CONTENT_FILE.to_string());
    let loose = LooseRoot::new(&extension.path, hidden);
    if loose.has_content()? {
        layers.push(Layer::loose(LayerKind::ExtensionLoose(slot.clone()), loose));
    }

    Ok(layers)
}
