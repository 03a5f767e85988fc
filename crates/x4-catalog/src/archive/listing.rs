//! Catalog listing (`.cat`) parser
//!
//! A listing is plain text with one record per line:
//!
//! ```text
//! libraries/wares.xml 18234 1606753320 7dd3c1d6f1a3b8d5b4e0f9d5e3c1a2b4
//! assets/fx/macros/foo macro.xml 311 1606753320 0c1b8e2c7a1f00d55e9e1a5ad0e7c0a1
//! ```
//!
//! Fields are `<path> <size> <mtime> <md5>`. The path may contain spaces,
//! so records are split from the right. Tools that strip the auxiliary
//! columns produce `<path> <size>`, which is accepted as well. No offsets
//! are stored: the blob holds the entries back to back in listing order.

use crate::path::LogicalPath;
use crate::{CatalogError, Result};
use std::path::Path;

/// Length of an MD5 digest in hex characters.
const MD5_HEX_LEN: usize = 32;

/// One parsed listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    /// Logical path of the entry
    pub path: LogicalPath,
    /// Byte length inside the blob
    pub size: u64,
    /// Unix timestamp, when listed
    pub modified: Option<u64>,
    /// Lower-case MD5 hex digest, when listed
    pub checksum: Option<String>,
}

/// Parse the full text of a listing.
///
/// `source` is only used to label errors.
pub fn parse_listing(content: &str, source: &Path) -> Result<Vec<ListingRecord>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let record = parse_line(line).map_err(|reason| CatalogError::InvalidListing {
            path: source.to_path_buf(),
            line: index + 1,
            reason,
        })?;
        records.push(record);
    }

    Ok(records)
}

fn parse_line(line: &str) -> std::result::Result<ListingRecord, String> {
    if let Some(record) = parse_full(line)? {
        return Ok(record);
    }

    let (path, size) = line
        .rsplit_once(' ')
        .ok_or_else(|| format!("expected '<path> <size> [<mtime> <md5>]', got {line:?}"))?;
    let size = size
        .parse::<u64>()
        .map_err(|_| format!("invalid size {size:?}"))?;

    Ok(ListingRecord {
        path: parse_path(path)?,
        size,
        modified: None,
        checksum: None,
    })
}

/// Four-column form, or `None` when the tail does not look like one.
fn parse_full(line: &str) -> std::result::Result<Option<ListingRecord>, String> {
    let mut fields = line.rsplitn(4, ' ');
    let (Some(checksum), Some(modified), Some(size), Some(path)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Ok(None);
    };

    if checksum.len() != MD5_HEX_LEN || !checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Ok(None);
    }
    let (Ok(size), Ok(modified)) = (size.parse::<u64>(), modified.parse::<u64>()) else {
        return Ok(None);
    };

    Ok(Some(ListingRecord {
        path: parse_path(path)?,
        size,
        modified: Some(modified),
        checksum: Some(checksum.to_ascii_lowercase()),
    }))
}

fn parse_path(raw: &str) -> std::result::Result<LogicalPath, String> {
    LogicalPath::parse(raw).map_err(|e| e.to_string())
}
