//! Error types for catalog resolution

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or querying a catalog resolver.
///
/// Three families matter to callers:
///
/// - structural integrity ([`Integrity`](Self::Integrity),
///   [`MissingPair`](Self::MissingPair), [`InvalidListing`](Self::InvalidListing)):
///   the installation itself is broken, retrying will not help
/// - not found ([`NotFound`](Self::NotFound),
///   [`IndexKeyNotFound`](Self::IndexKeyNotFound)): expected, see
///   [`is_not_found`](Self::is_not_found)
/// - invalid argument ([`InvalidPath`](Self::InvalidPath)): rejected before
///   any layer is searched
#[derive(Error, Debug)]
pub enum CatalogError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A catalog listing does not describe its blob.
    #[error("Catalog integrity error in {path}: {reason}")]
    Integrity {
        /// Listing or blob that failed validation
        path: PathBuf,
        /// What did not add up
        reason: String,
    },

    /// A `.cat` without its `.dat` (or the reverse).
    #[error("Catalog pair incomplete: {path} has no partner file")]
    MissingPair {
        /// The file whose partner is missing
        path: PathBuf,
    },

    /// A listing line that could not be parsed.
    #[error("Invalid catalog listing {path} at line {line}: {reason}")]
    InvalidListing {
        /// Listing file
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// Parse failure
        reason: String,
    },

    /// Logical path not present in any layer.
    #[error("File not found in catalog: {path}")]
    NotFound {
        /// Path exactly as requested by the caller
        path: String,
    },

    /// Key not present in the merged index.
    #[error("Key '{key}' not found in index {index}")]
    IndexKeyNotFound {
        /// Index file path as requested
        index: String,
        /// Requested key
        key: String,
    },

    /// Malformed logical path.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// XML document could not be parsed.
    #[error("Invalid XML in {path}: {source}")]
    Xml {
        /// Logical or filesystem path of the document
        path: String,
        /// Parser error
        #[source]
        source: xmltree::ParseError,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CatalogError {
    /// Whether this is the recoverable "does not exist" case.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::IndexKeyNotFound { .. })
    }

    /// Whether the installation itself is malformed.
    pub const fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::Integrity { .. } | Self::MissingPair { .. } | Self::InvalidListing { .. }
        )
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub(crate) fn integrity(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Integrity {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
