//! Caller-owned read handles returned by the resolver

use crate::archive::EntryReader;
use crate::layer::LayerKind;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

enum Source {
    Packed(EntryReader),
    Loose(BufReader<File>),
}

/// An opened catalog file.
///
/// Packed entries read from the archive's shared memory map; loose files
/// hold their own file handle, released when the stream is dropped.
pub struct CatalogStream {
    source: Source,
    layer: LayerKind,
    len: u64,
}

impl CatalogStream {
    pub(crate) fn packed(reader: EntryReader, layer: LayerKind) -> Self {
        Self {
            len: reader.len(),
            source: Source::Packed(reader),
            layer,
        }
    }

    pub(crate) fn loose(path: &Path, layer: LayerKind) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            source: Source::Loose(BufReader::new(file)),
            layer,
            len,
        })
    }

    /// Size of the file in bytes.
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether the file is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The layer that served this file.
    pub const fn layer(&self) -> &LayerKind {
        &self.layer
    }

    /// Whether the bytes come from a catalog blob.
    pub const fn is_packed(&self) -> bool {
        matches!(self.source, Source::Packed(_))
    }

    /// Read the remaining bytes into a vector.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(usize::try_from(self.len).unwrap_or(0));
        self.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl Read for CatalogStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.source {
            Source::Packed(reader) => reader.read(buf),
            Source::Loose(file) => file.read(buf),
        }
    }
}

impl Seek for CatalogStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.source {
            Source::Packed(reader) => reader.seek(pos),
            Source::Loose(file) => file.seek(pos),
        }
    }
}

impl std::fmt::Debug for CatalogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStream")
            .field("layer", &self.layer)
            .field("len", &self.len)
            .field("packed", &self.is_packed())
            .finish()
    }
}
