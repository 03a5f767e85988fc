//! Layered catalog resolver for X4 game installations.
//!
//! An installation ships its assets packed into numbered catalog pairs
//! (`01.cat` listing + `01.dat` blob), may carry loose files next to them,
//! and can be extended by any number of mods under `extensions/`. This crate
//! stacks all of those sources into one read-only virtual filesystem:
//!
//! - **Vanilla archives**: `NN.cat`/`NN.dat`, higher `NN` wins
//! - **Loose root**: unpacked files in the installation root
//! - **Extension archives**: `extensions/<mod>/ext_NN.cat`/`.dat`
//! - **Extension loose files**: unpacked files inside a mod directory
//!
//! Extensions always outrank the base game, and loose files always outrank
//! the packed data of the same origin.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::io::Read;
//! use x4_catalog::CatalogResolver;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = CatalogResolver::new("/games/X4 Foundations")?;
//! println!("build {}", catalog.version()?);
//!
//! let mut wares = String::new();
//! catalog.open_file("libraries/wares.xml")?.read_to_string(&mut wares)?;
//!
//! let macro_doc = catalog.open_index_xml("index/macros.xml", "ship_arg_s_fighter_01_a_macro")?;
//! println!("{}", macro_doc.name);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

// Catalog pair parsing and extraction
pub mod archive;

// Configuration
pub mod config;

// Layer discovery
pub mod enumerate;

// Error types
pub mod error;

// Extension manifests and load order
pub mod extension;

// Key -> path index merging
pub mod index;

// Layer model and ordering
pub mod layer;

// Logical path normalization
pub mod path;

// Resolver facade
pub mod resolver;

// Caller-owned read handles
pub mod stream;

pub use archive::{Archive, CatalogEntry, EntryReader};
pub use config::CatalogConfig;
pub use error::{CatalogError, Result};
pub use extension::{Extension, ExtensionManifest};
pub use index::{IndexEntry, IndexTable};
pub use layer::{ExtensionSlot, Layer, LayerKind, LayerSource, LooseRoot};
pub use path::LogicalPath;
pub use resolver::CatalogResolver;
pub use stream::CatalogStream;

/// Parsed XML document returned by [`CatalogResolver::open_xml`] and
/// [`CatalogResolver::open_index_xml`].
pub type XmlDocument = xmltree::Element;

/// Version information for this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory holding installed extensions, relative to the installation root.
pub const EXTENSIONS_DIR: &str = "extensions";

/// Version marker file, resolved like any other logical path.
pub const VERSION_FILE: &str = "version.dat";

/// Extension manifest filename inside a mod directory.
pub const CONTENT_FILE: &str = "content.xml";

/// Catalog listing extension.
pub const CAT_EXTENSION: &str = "cat";

/// Catalog blob extension.
pub const DAT_EXTENSION: &str = "dat";

/// Filename prefix of catalog pairs shipped inside an extension (`ext_01.cat`).
pub const EXTENSION_ARCHIVE_PREFIX: &str = "ext_";
