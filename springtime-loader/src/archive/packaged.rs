//! Archives embedded in a packaged tar stream.
//!
//! A packaged artifact is either a plain tar file or a tar payload appended to an executable,
//! followed by a [trailer](write_trailer) pointing at the payload start. Nested library archives
//! are tar streams stored as regular entries and share the memory of the outer artifact, while
//! nested directories are views over a subset of the outer entries.

use crate::archive::manifest::{Manifest, MANIFEST_NAME};
use crate::archive::{normalize_entry_name, Archive, ArchivePtr, ArchiveUrl, Entry};
use crate::error::ArchiveError;
use bytes::Bytes;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::fs;
use std::io::{self, Cursor, Write};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Magic bytes identifying a payload trailer.
pub const TRAILER_MAGIC: &[u8; 8] = b"SPRTBOOT";

/// Length of a payload trailer: magic followed by a little-endian `u64` payload offset.
pub const TRAILER_LENGTH: usize = 16;

/// Writes a trailer marking the tar payload appended to an executable at given offset.
pub fn write_trailer<W: Write>(writer: &mut W, payload_offset: u64) -> io::Result<()> {
    writer.write_all(TRAILER_MAGIC)?;
    writer.write_all(&payload_offset.to_le_bytes())
}

#[derive(Clone, Debug)]
struct IndexedEntry {
    entry: Entry,
    data: Range<usize>,
}

#[derive(Debug, Default)]
struct Index {
    entries: Vec<IndexedEntry>,
    by_name: FxHashMap<String, usize>,
    manifest: Option<Arc<Manifest>>,
}

impl Index {
    fn get(&self, name: &str) -> Option<&IndexedEntry> {
        self.by_name.get(name).map(|index| &self.entries[*index])
    }
}

/// An archive backed by a packaged tar stream. When created with a prefix, the archive is a view
/// of a directory inside the stream with entry names relative to that directory.
#[derive(Debug)]
pub struct PackagedArchive {
    url: ArchiveUrl,
    data: Bytes,
    prefix: Option<String>,
    index: RwLock<Option<Arc<Index>>>,
}

impl PackagedArchive {
    /// Opens a packaged artifact from the filesystem.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let url = ArchiveUrl::packaged(path);
        let data = payload(&url, Bytes::from(data))?;

        trace!(%url, size = data.len(), "Opened packaged archive");

        Ok(Self::from_stream(url, data))
    }

    /// Creates an archive from an in-memory tar stream.
    pub fn from_stream(url: ArchiveUrl, data: Bytes) -> Self {
        Self {
            url,
            data,
            prefix: None,
            index: Default::default(),
        }
    }

    fn directory(&self, name: &str) -> Self {
        Self {
            url: self.url.nested(name),
            data: self.data.clone(),
            prefix: Some(self.qualified_name(name)),
            index: Default::default(),
        }
    }

    fn qualified_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{name}"),
            None => name.to_string(),
        }
    }

    fn index(&self) -> Result<Arc<Index>, ArchiveError> {
        if let Some(index) = self.index.read().as_ref() {
            return Ok(index.clone());
        }

        let index = Arc::new(self.build_index()?);
        Ok(self.index.write().get_or_insert(index).clone())
    }

    fn build_index(&self) -> Result<Index, ArchiveError> {
        let malformed = |error: io::Error| ArchiveError::Malformed {
            url: self.url.clone(),
            reason: error.to_string(),
        };

        let mut archive = tar::Archive::new(Cursor::new(&self.data[..]));
        let mut index = Index::default();
        let mut manifest_range = None;

        for entry in archive.entries().map_err(malformed)? {
            let entry = entry.map_err(malformed)?;
            let entry_type = entry.header().entry_type();
            let is_directory = entry_type.is_dir();
            if !is_directory && !entry_type.is_file() {
                continue;
            }

            let raw_name = String::from_utf8_lossy(&*entry.path_bytes()).into_owned();
            let Some(name) = normalize_entry_name(&raw_name, is_directory) else {
                continue;
            };

            let start = entry.raw_file_position() as usize;
            let end = start + entry.size() as usize;
            if end > self.data.len() {
                return Err(ArchiveError::Malformed {
                    url: self.url.clone(),
                    reason: format!("entry {name} exceeds archive bounds"),
                });
            }

            if name == MANIFEST_NAME {
                manifest_range = Some(start..end);
            }

            let name = match &self.prefix {
                Some(prefix) => match name.strip_prefix(prefix.as_str()) {
                    Some(relative) if !relative.is_empty() => relative.to_string(),
                    _ => continue,
                },
                None => name,
            };

            index.by_name.insert(name.clone(), index.entries.len());
            index.entries.push(IndexedEntry {
                entry: Entry::new(name, is_directory),
                data: start..end,
            });
        }

        // directory views share the manifest of the enclosing archive
        index.manifest = manifest_range.map(|range| Arc::new(Manifest::parse(&self.data[range])));

        trace!(url = %self.url, entries = index.entries.len(), "Indexed packaged archive");

        Ok(index)
    }

    fn nested(&self, entry: &IndexedEntry) -> PackagedArchive {
        if entry.entry.is_directory() {
            self.directory(entry.entry.name())
        } else {
            Self::from_stream(
                self.url.nested(entry.entry.name()),
                self.data.slice(entry.data.clone()),
            )
        }
    }

    #[cfg(test)]
    fn is_indexed(&self) -> bool {
        self.index.read().is_some()
    }
}

impl Archive for PackagedArchive {
    fn url(&self) -> ArchiveUrl {
        self.url.clone()
    }

    fn manifest(&self) -> Result<Option<Arc<Manifest>>, ArchiveError> {
        self.index().map(|index| index.manifest.clone())
    }

    fn entries(&self) -> Result<Vec<Entry>, ArchiveError> {
        self.index().map(|index| {
            index
                .entries
                .iter()
                .map(|entry| entry.entry.clone())
                .collect()
        })
    }

    fn entry(&self, name: &str) -> Result<Option<Entry>, ArchiveError> {
        self.index()
            .map(|index| index.get(name).map(|entry| entry.entry.clone()))
    }

    fn read_entry(&self, name: &str) -> Result<Option<Bytes>, ArchiveError> {
        self.index().map(|index| {
            index
                .get(name)
                .filter(|entry| !entry.entry.is_directory())
                .map(|entry| self.data.slice(entry.data.clone()))
        })
    }

    fn nested_archives(
        &self,
        filter: &dyn Fn(&Entry) -> bool,
    ) -> Result<Vec<ArchivePtr>, ArchiveError> {
        let index = self.index()?;
        Ok(index
            .entries
            .iter()
            .filter(|entry| filter(&entry.entry))
            .map(|entry| Arc::new(self.nested(entry)) as ArchivePtr)
            .collect())
    }

    fn nested_archive(&self, name: &str) -> Result<Option<ArchivePtr>, ArchiveError> {
        let index = self.index()?;
        let name = name.trim_end_matches('/');
        Ok(index
            .get(name)
            .or_else(|| index.get(&format!("{name}/")))
            .map(|entry| Arc::new(self.nested(entry)) as ArchivePtr))
    }

    #[inline]
    fn is_packaged(&self) -> bool {
        true
    }

    fn clear_cache(&self) {
        trace!(url = %self.url, "Clearing packaged archive cache");
        *self.index.write() = None;
    }
}

fn payload(url: &ArchiveUrl, data: Bytes) -> Result<Bytes, ArchiveError> {
    if data.len() < TRAILER_LENGTH {
        return Ok(data);
    }

    let trailer_start = data.len() - TRAILER_LENGTH;
    let trailer = &data[trailer_start..];
    if &trailer[..TRAILER_MAGIC.len()] != TRAILER_MAGIC {
        return Ok(data);
    }

    let mut offset = [0u8; 8];
    offset.copy_from_slice(&trailer[TRAILER_MAGIC.len()..]);
    let offset = u64::from_le_bytes(offset) as usize;

    if offset > trailer_start {
        return Err(ArchiveError::Malformed {
            url: url.clone(),
            reason: format!("payload offset {offset} exceeds artifact size"),
        });
    }

    Ok(data.slice(offset..trailer_start))
}
