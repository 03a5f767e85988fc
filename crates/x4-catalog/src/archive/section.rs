//! Bounded, seekable views into a catalog blob

use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Read-only contents of a `.dat` blob.
///
/// Empty blobs cannot be memory-mapped on every platform, so they are kept
/// without a mapping.
pub(crate) struct Blob {
    mmap: Option<Mmap>,
}

impl Blob {
    pub(crate) fn open(path: &Path) -> io::Result<(Self, u64)> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();

        if size == 0 {
            return Ok((Self { mmap: None }, 0));
        }

        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        debug!("Mapped catalog blob {} ({} bytes)", path.display(), size);

        Ok((Self { mmap: Some(mmap) }, size))
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

/// A single catalog entry opened for reading.
///
/// Reads are confined to `[offset, offset + len)` of the blob. Each reader
/// keeps its own cursor, so several readers over the same archive never
/// interfere; cloning one yields an independent cursor at the same position.
#[derive(Clone)]
pub struct EntryReader {
    blob: Arc<Blob>,
    offset: u64,
    len: u64,
    pos: u64,
}

impl EntryReader {
    pub(crate) fn new(blob: Arc<Blob>, offset: u64, len: u64) -> Self {
        Self {
            blob,
            offset,
            len,
            pos: 0,
        }
    }

    /// Length of the entry in bytes.
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether the entry is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current position relative to the start of the entry.
    pub const fn position(&self) -> u64 {
        self.pos
    }

    /// The whole entry as a borrowed slice.
    pub fn as_slice(&self) -> &[u8] {
        let start = self.offset as usize;
        &self.blob.bytes()[start..start + self.len as usize]
    }

    fn remaining(&self) -> &[u8] {
        let slice = self.as_slice();
        let pos = self.pos.min(self.len) as usize;
        &slice[pos..]
    }
}

impl std::fmt::Debug for EntryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.pos += count as u64;
        Ok(count)
    }
}

impl Seek for EntryReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };

        match target {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
