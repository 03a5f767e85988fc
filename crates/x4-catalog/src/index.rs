//! Index documents: stable keys mapped to asset paths
//!
//! Assets such as macros and components are addressed by name through index
//! files like `index/macros.xml`:
//!
//! ```xml
//! <index>
//!   <entry name="foo_macro" value="assets\fx\macros\foo_macro" />
//! </index>
//! ```
//!
//! The base game ships the baseline document and extensions contribute
//! their own, either as another `<index>` document or as a `<diff>` patch:
//!
//! ```xml
//! <diff>
//!   <add sel="/index">
//!     <entry name="baz_macro" value="extensions\my_mod\assets\baz_macro" />
//!   </add>
//!   <replace sel="/index/entry[@name='foo_macro']/@value">assets\fx\other</replace>
//!   <remove sel="/index/entry[@name='old_macro']" />
//! </diff>
//! ```
//!
//! Fragments are applied from the lowest-priority layer to the highest, so
//! the highest layer that mentions a key decides its target.

use crate::layer::{Layer, LayerKind};
use crate::path::LogicalPath;
use crate::resolver::parse_xml;
use crate::{Result, XmlDocument};
use std::collections::HashMap;
use tracing::{debug, warn};
use xmltree::XMLNode;

/// Extension appended to index values that carry none.
const INDEX_TARGET_EXTENSION: &str = "xml";

/// One merged index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Key as written by the layer that last set it
    pub key: String,
    /// Asset the key points to
    pub target: LogicalPath,
    /// Layer that last set the entry
    pub layer: LayerKind,
}

/// Key -> path table merged across all layers.
#[derive(Debug, Clone, Default)]
pub struct IndexTable {
    entries: HashMap<String, IndexEntry>,
}

impl IndexTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge every fragment of `path` found in `layers`.
    ///
    /// `layers` must be ordered from highest to lowest priority, the order the
    /// resolver keeps them in; they are applied in reverse.
    pub fn merge<'a, I>(layers: I, path: &LogicalPath) -> Result<Self>
    where
        I: DoubleEndedIterator<Item = &'a Layer>,
    {
        let mut table = Self::new();
        for layer in layers.rev() {
            let Some(stream) = layer.open(path)? else {
                continue;
            };
            let label = format!("{path} ({})", layer.kind());
            let document = parse_xml(stream, &label)?;
            debug!("Applying index fragment {label}");
            table.apply(&document, layer.kind());
        }
        debug!("Merged index {path}: {} entries", table.len());
        Ok(table)
    }

    /// Apply one fragment on top of the current state.
    pub fn apply(&mut self, document: &XmlDocument, layer: &LayerKind) {
        if document.name == "diff" {
            self.apply_diff(document, layer);
        } else {
            for entry in child_elements(document).filter(|e| e.name == "entry") {
                self.insert_element(entry, layer);
            }
        }
    }

    fn apply_diff(&mut self, diff: &XmlDocument, layer: &LayerKind) {
        for operation in child_elements(diff) {
            let selector = operation
                .attributes
                .get("sel")
                .map_or("", String::as_str);

            match operation.name.as_str() {
                "add" => {
                    for entry in child_elements(operation).filter(|e| e.name == "entry") {
                        self.insert_element(entry, layer);
                    }
                }
                "remove" => match parse_selector(selector) {
                    Some(Selector::Entry(key)) => {
                        self.entries.remove(&key.to_lowercase());
                    }
                    _ => debug!("Ignoring unsupported index remove selector {selector:?}"),
                },
                "replace" => match parse_selector(selector) {
                    Some(Selector::Value(key)) => {
                        let value = operation.get_text().unwrap_or_default();
                        self.insert(key, value.trim(), layer);
                    }
                    Some(Selector::Entry(key)) => {
                        self.entries.remove(&key.to_lowercase());
                        for entry in child_elements(operation).filter(|e| e.name == "entry") {
                            self.insert_element(entry, layer);
                        }
                    }
                    None => debug!("Ignoring unsupported index replace selector {selector:?}"),
                },
                other => debug!("Ignoring index diff operation <{other}>"),
            }
        }
    }

    fn insert_element(&mut self, element: &XmlDocument, layer: &LayerKind) {
        match (element.attributes.get("name"), element.attributes.get("value")) {
            (Some(name), Some(value)) => self.insert(name, value, layer),
            _ => debug!("Skipping index entry without name or value"),
        }
    }

    fn insert(&mut self, key: &str, value: &str, layer: &LayerKind) {
        let key = key.trim();
        if key.is_empty() {
            return;
        }

        let target = match LogicalPath::parse(value) {
            Ok(target) => target.with_default_extension(INDEX_TARGET_EXTENSION),
            Err(e) => {
                warn!("Index entry {key} in {layer} has unusable target {value:?}: {e}");
                return;
            }
        };

        self.entries.insert(
            key.to_lowercase(),
            IndexEntry {
                key: key.to_string(),
                target,
                layer: layer.clone(),
            },
        );
    }

    /// Look up a key (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.entries.get(&key.trim().to_lowercase())
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }
}

fn child_elements(element: &XmlDocument) -> impl Iterator<Item = &XmlDocument> {
    element.children.iter().filter_map(XMLNode::as_element)
}

/// The two selector shapes index patches use.
#[derive(Debug, PartialEq, Eq)]
enum Selector<'a> {
    /// `/index/entry[@name='k']`
    Entry(&'a str),
    /// `/index/entry[@name='k']/@value`
    Value(&'a str),
}

fn parse_selector(selector: &str) -> Option<Selector<'_>> {
    let selector = selector.trim();
    let (entry, value) = match selector.strip_suffix("/@value") {
        Some(entry) => (entry, true),
        None => (selector, false),
    };

    let predicate = entry
        .strip_prefix("/index/entry[@name=")?
        .strip_suffix(']')?;
    let key = predicate
        .strip_prefix('\'')
        .and_then(|p| p.strip_suffix('\''))
        .or_else(|| predicate.strip_prefix('"').and_then(|p| p.strip_suffix('"')))?;

    Some(if value {
        Selector::Value(key)
    } else {
        Selector::Entry(key)
    })
}
