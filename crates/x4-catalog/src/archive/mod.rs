//! Catalog pair (`N.cat` + `N.dat`) handling

mod listing;
mod section;

pub use listing::{ListingRecord, parse_listing};
pub use section::EntryReader;

use crate::path::LogicalPath;
use crate::{CatalogError, Result};
use section::Blob;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Digest the game tools write for zero-length entries.
const EMPTY_ENTRY_CHECKSUM: &str = "00000000000000000000000000000000";

/// One file packed inside a catalog pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Logical path of the file
    pub path: LogicalPath,
    /// Byte offset inside the blob
    pub offset: u64,
    /// Byte length
    pub size: u64,
    /// Unix timestamp from the listing
    pub modified: Option<u64>,
    /// MD5 hex digest from the listing
    pub checksum: Option<String>,
}

/// A parsed catalog listing together with its memory-mapped blob.
///
/// Offsets are derived once, at open time, as the running sum of the sizes
/// of all preceding records.
pub struct Archive {
    listing_path: PathBuf,
    blob_path: PathBuf,
    /// Entries in listing order
    entries: Vec<CatalogEntry>,
    /// Case-folded path -> index into `entries`
    lookup: HashMap<String, usize>,
    blob: Arc<Blob>,
    blob_len: u64,
}

impl Archive {
    /// Open a catalog pair.
    ///
    /// Fails with a structural error when the listing cannot be parsed or
    /// the sizes it lists do not add up to the blob length.
    pub fn open(listing_path: impl AsRef<Path>, blob_path: impl AsRef<Path>) -> Result<Self> {
        let listing_path = listing_path.as_ref().to_path_buf();
        let blob_path = blob_path.as_ref().to_path_buf();

        let raw = std::fs::read(&listing_path)?;
        let content = String::from_utf8(raw).map_err(|e| {
            CatalogError::integrity(&listing_path, format!("listing is not valid UTF-8: {e}"))
        })?;
        let records = parse_listing(&content, &listing_path)?;

        let mut entries = Vec::with_capacity(records.len());
        let mut lookup = HashMap::with_capacity(records.len());
        let mut offset = 0u64;

        for record in records {
            let key = record.path.key().to_string();
            if let Some(previous) = lookup.insert(key, entries.len()) {
                warn!(
                    "Duplicate entry {} in {} (previous at index {}), later record wins",
                    record.path,
                    listing_path.display(),
                    previous
                );
            }

            let size = record.size;
            entries.push(CatalogEntry {
                path: record.path,
                offset,
                size,
                modified: record.modified,
                checksum: record.checksum,
            });

            offset = offset.checked_add(size).ok_or_else(|| {
                CatalogError::integrity(&listing_path, "cumulative entry size overflows u64")
            })?;
        }

        let (blob, blob_len) = Blob::open(&blob_path)?;
        if offset != blob_len {
            return Err(CatalogError::integrity(
                &blob_path,
                format!(
                    "listing {} describes {offset} bytes but blob holds {blob_len}",
                    listing_path.display()
                ),
            ));
        }

        debug!(
            "Opened catalog {} with {} entries ({} bytes)",
            listing_path.display(),
            entries.len(),
            blob_len
        );

        Ok(Self {
            listing_path,
            blob_path,
            entries,
            lookup,
            blob: Arc::new(blob),
            blob_len,
        })
    }

    /// Look up an entry.
    pub fn entry(&self, path: &LogicalPath) -> Option<&CatalogEntry> {
        self.lookup.get(path.key()).map(|&index| &self.entries[index])
    }

    /// Check whether the archive holds `path`.
    pub fn contains(&self, path: &LogicalPath) -> bool {
        self.lookup.contains_key(path.key())
    }

    /// Open an entry for reading, or `None` when it is not listed.
    pub fn try_extract(&self, path: &LogicalPath) -> Option<EntryReader> {
        self.entry(path).map(|entry| self.reader_for(entry))
    }

    /// Open an entry for reading.
    pub fn extract(&self, path: &LogicalPath) -> Result<EntryReader> {
        self.try_extract(path)
            .ok_or_else(|| CatalogError::not_found(path.as_str()))
    }

    /// Open a reader for an entry of this archive.
    pub fn reader_for(&self, entry: &CatalogEntry) -> EntryReader {
        EntryReader::new(Arc::clone(&self.blob), entry.offset, entry.size)
    }

    /// Compare the entry's bytes against the listed MD5 digest.
    ///
    /// Entries listed without a digest are reported as valid.
    pub fn verify_entry(&self, path: &LogicalPath) -> Result<bool> {
        let entry = self
            .entry(path)
            .ok_or_else(|| CatalogError::not_found(path.as_str()))?;
        Ok(self.verify(entry))
    }

    /// Paths of all entries whose bytes do not match their listed digest.
    pub fn verify_all(&self) -> Vec<LogicalPath> {
        self.entries
            .iter()
            .filter(|entry| !self.verify(entry))
            .map(|entry| entry.path.clone())
            .collect()
    }

    fn verify(&self, entry: &CatalogEntry) -> bool {
        let Some(expected) = entry.checksum.as_deref() else {
            return true;
        };
        if entry.size == 0 && expected == EMPTY_ENTRY_CHECKSUM {
            return true;
        }

        let reader = self.reader_for(entry);
        let digest = md5::compute(reader.as_slice());
        hex::encode(digest.0).eq_ignore_ascii_case(expected)
    }

    /// Entries in listing order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the listing is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Length of the blob in bytes.
    pub const fn blob_len(&self) -> u64 {
        self.blob_len
    }

    /// Path of the `.cat` file.
    pub fn listing_path(&self) -> &Path {
        &self.listing_path
    }

    /// Path of the `.dat` file.
    pub fn blob_path(&self) -> &Path {
        &self.blob_path
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("listing_path", &self.listing_path)
            .field("entries", &self.entries.len())
            .field("blob_len", &self.blob_len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{Read, Seek, SeekFrom};
    use tempfile::{TempDir, tempdir};

    fn md5_hex(data: &[u8]) -> String {
        hex::encode(md5::compute(data).0)
    }

    fn write_pair(files: &[(&str, &[u8])]) -> (TempDir, PathBuf, PathBuf) {
        let dir = tempdir().expect("tempdir");
        let cat = dir.path().join("01.cat");
        let dat = dir.path().join("01.dat");

        let mut listing = String::new();
        let mut blob = Vec::new();
        for (name, data) in files {
            listing.push_str(&format!(
                "{name} {} 1606753320 {}\n",
                data.len(),
                md5_hex(data)
            ));
            blob.extend_from_slice(data);
        }
        std::fs::write(&cat, listing).expect("write cat");
        std::fs::write(&dat, blob).expect("write dat");
        (dir, cat, dat)
    }

    fn path(raw: &str) -> LogicalPath {
        LogicalPath::parse(raw).expect("path")
    }

    #[test]
    fn test_offsets_are_cumulative() {
        let (_dir, cat, dat) = write_pair(&[
            ("a.txt", b"alpha"),
            ("dir/b.txt", b"bravo!"),
            ("dir/with space/c.txt", b"charlie"),
        ]);
        let archive = Archive::open(&cat, &dat).expect("open");

        let offsets: Vec<(u64, u64)> = archive.entries().map(|e| (e.offset, e.size)).collect();
        assert_eq!(offsets, vec![(0, 5), (5, 6), (11, 7)]);
        assert_eq!(archive.blob_len(), 18);
        assert_eq!(archive.len(), 3);
    }

    #[test]
    fn test_extract_entry() {
        let (_dir, cat, dat) = write_pair(&[("a.txt", b"alpha"), ("Dir/B.txt", b"bravo!")]);
        let archive = Archive::open(&cat, &dat).expect("open");

        let mut reader = archive.extract(&path("dir\\b.TXT")).expect("extract");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read");
        assert_eq!(out, b"bravo!");

        reader.seek(SeekFrom::Start(2)).expect("seek");
        out.clear();
        reader.read_to_end(&mut out).expect("read");
        assert_eq!(out, b"avo!");

        assert!(archive.try_extract(&path("missing.txt")).is_none());
        let err = archive.extract(&path("missing.txt")).expect_err("missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_size_mismatch_is_integrity_error() {
        let (_dir, cat, dat) = write_pair(&[("a.txt", b"alpha")]);
        std::fs::write(&dat, b"alphaEXTRA").expect("rewrite dat");

        let err = Archive::open(&cat, &dat).expect_err("mismatch");
        assert!(err.is_integrity());
        assert!(err.to_string().contains("describes 5 bytes but blob holds 10"));
    }

    #[test]
    fn test_missing_blob_is_io_error() {
        let (dir, cat, _dat) = write_pair(&[("a.txt", b"alpha")]);
        let err = Archive::open(&cat, dir.path().join("02.dat")).expect_err("missing");
        assert!(matches!(err, CatalogError::Io(_)));
    }

    #[test]
    fn test_empty_pair() {
        let (_dir, cat, dat) = write_pair(&[]);
        let archive = Archive::open(&cat, &dat).expect("open");
        assert!(archive.is_empty());
        assert_eq!(archive.blob_len(), 0);
    }

    #[test]
    fn test_zero_length_entry() {
        let (_dir, cat, dat) = write_pair(&[("empty.txt", b""), ("b.txt", b"xy")]);
        let archive = Archive::open(&cat, &dat).expect("open");
        let reader = archive.extract(&path("empty.txt")).expect("extract");
        assert!(reader.is_empty());
        assert!(archive.verify_entry(&path("empty.txt")).expect("verify"));
    }

    #[test]
    fn test_duplicate_entry_later_wins() {
        let dir = tempdir().expect("tempdir");
        let cat = dir.path().join("01.cat");
        let dat = dir.path().join("01.dat");
        std::fs::write(&cat, "a.txt 3\nA.TXT 4\n").expect("write cat");
        std::fs::write(&dat, b"old!new").expect("write dat");

        let archive = Archive::open(&cat, &dat).expect("open");
        let reader = archive.extract(&path("a.txt")).expect("extract");
        assert_eq!(reader.as_slice(), b"!new");
    }

    #[test]
    fn test_verify_checksums() {
        let (_dir, cat, dat) = write_pair(&[("a.txt", b"alpha"), ("b.txt", b"bravo")]);
        let archive = Archive::open(&cat, &dat).expect("open");
        assert!(archive.verify_all().is_empty());
        assert!(archive.verify_entry(&path("a.txt")).expect("verify"));
        drop(archive);

        // Same sizes, different bytes.
        std::fs::write(&dat, b"alphaBRAVO").expect("rewrite dat");
        let archive = Archive::open(&cat, &dat).expect("open");
        assert_eq!(archive.verify_all(), vec![path("b.txt")]);
    }
}
