//! Logical path normalization
//!
//! Every lookup, whether against a catalog listing or a loose directory,
//! goes through [`LogicalPath`]. The game addresses assets with either slash
//! style and without regard to case, so the canonical form uses forward
//! slashes only and the lookup key is lower-cased. Spaces inside segments
//! are part of the name and kept as they are.

use crate::{CatalogError, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

/// A normalized, game-relative path.
///
/// Equality and hashing use the case-folded key, so `Libraries/Wares.xml`
/// and `libraries\wares.xml` are the same logical path.
#[derive(Debug, Clone)]
pub struct LogicalPath {
    normalized: String,
    key: String,
}

impl LogicalPath {
    /// Normalize `raw` into a logical path.
    ///
    /// Backslashes become forward slashes, empty and `.` segments are
    /// dropped. Empty input, `..` segments and NUL bytes are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(CatalogError::InvalidPath("path is empty".to_string()));
        }
        if raw.contains('\0') {
            return Err(CatalogError::InvalidPath(format!(
                "path contains a NUL byte: {raw:?}"
            )));
        }

        let mut segments = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(CatalogError::InvalidPath(format!(
                        "parent segments are not allowed: {raw}"
                    )));
                }
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(CatalogError::InvalidPath(format!(
                "path has no file component: {raw}"
            )));
        }

        let normalized = segments.join("/");
        let key = normalized.to_lowercase();
        Ok(Self { normalized, key })
    }

    /// The normalized path with its original casing.
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// The case-folded lookup key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.normalized.split('/')
    }

    /// Final segment.
    pub fn file_name(&self) -> &str {
        self.normalized
            .rsplit_once('/')
            .map_or(self.normalized.as_str(), |(_, name)| name)
    }

    /// Extension of the final segment, if any.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }

    /// Append `.ext` when the final segment has no extension.
    #[must_use]
    pub fn with_default_extension(&self, ext: &str) -> Self {
        if self.extension().is_some() {
            return self.clone();
        }
        let normalized = format!("{}.{ext}", self.normalized);
        let key = normalized.to_lowercase();
        Self { normalized, key }
    }

    /// Split off the first segment, `None` for single-segment paths.
    pub fn split_first(&self) -> Option<(&str, Self)> {
        let (head, rest) = self.normalized.split_once('/')?;
        let rest = Self {
            normalized: rest.to_string(),
            key: rest.to_lowercase(),
        };
        Some((head, rest))
    }

    /// Whether this path lives under the directory `prefix` (case-insensitive).
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.key == prefix.key
            || (self.key.starts_with(&prefix.key)
                && self.key.as_bytes().get(prefix.key.len()) == Some(&b'/'))
    }

    /// Join onto a filesystem directory without touching the disk.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        self.segments().fold(root.to_path_buf(), |acc, s| acc.join(s))
    }

    /// Find the file for this path under `root`.
    ///
    /// The exact spelling is tried first. On case-sensitive filesystems each
    /// missing segment is then matched against the directory listing without
    /// regard to case. Returns `Ok(None)` when nothing matches; other I/O
    /// failures are returned as errors.
    pub fn locate_in(&self, root: &Path) -> io::Result<Option<PathBuf>> {
        let direct = self.to_fs_path(root);
        if direct.is_file() {
            return Ok(Some(direct));
        }

        let mut current = root.to_path_buf();
        for segment in self.segments() {
            let candidate = current.join(segment);
            if candidate.exists() {
                current = candidate;
                continue;
            }

            let entries = match std::fs::read_dir(&current) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::NotADirectory => return Ok(None),
                Err(e) => return Err(e),
            };

            let wanted = segment.to_lowercase();
            let mut matched = None;
            for entry in entries {
                let entry = entry?;
                if entry.file_name().to_string_lossy().to_lowercase() == wanted {
                    matched = Some(entry.path());
                    break;
                }
            }

            match matched {
                Some(path) => current = path,
                None => return Ok(None),
            }
        }

        Ok(current.is_file().then_some(current))
    }
}

impl PartialEq for LogicalPath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for LogicalPath {}

impl Hash for LogicalPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl std::str::FromStr for LogicalPath {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
