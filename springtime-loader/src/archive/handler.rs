//! Resolution of [ArchiveUrls](ArchiveUrl) to open archives.
//!
//! A [Handler] keeps archives opened by the launcher, so resolving their urls later doesn't touch
//! the disk again. Resolution failures can be reported in two ways, governed by
//! [ConnectionOptions]: a *fast* failure is a cheap [ConnectionError::NotFound] returned as soon
//! as the cached path fails, while a regular failure falls back to re-reading the root artifact
//! and reports the detailed cause.

use crate::archive::exploded::ExplodedArchive;
use crate::archive::packaged::PackagedArchive;
use crate::archive::{ArchivePtr, ArchiveUrl};
use crate::error::{ArchiveError, ConnectionError};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

/// Options applying to a single resolution call. Options are passed explicitly to every
/// connection opened during the call, so they never outlive it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Return [ConnectionError::NotFound] immediately instead of probing fallbacks.
    pub fast_exceptions: bool,
}

impl ConnectionOptions {
    /// Options for speculative lookups, where a failure is an expected outcome.
    pub const fn fast() -> Self {
        Self {
            fast_exceptions: true,
        }
    }
}

/// An open connection to an archive.
#[derive(Clone, Debug)]
pub struct Connection {
    url: ArchiveUrl,
    archive: ArchivePtr,
}

impl Connection {
    #[inline]
    pub fn url(&self) -> &ArchiveUrl {
        &self.url
    }

    #[inline]
    pub fn archive(&self) -> &ArchivePtr {
        &self.archive
    }

    /// Checks if the connection points to a packaged archive.
    #[inline]
    pub fn is_packaged(&self) -> bool {
        self.archive.is_packaged()
    }
}

/// Url handler caching opened archives.
#[derive(Debug, Default)]
pub struct Handler {
    archives: RwLock<FxHashMap<ArchiveUrl, ArchivePtr>>,
}

impl Handler {
    /// Registers an already open archive, so that its url resolves to the same instance.
    pub fn register(&self, archive: ArchivePtr) {
        let url = archive.url();
        trace!(%url, "Registering archive");
        self.archives.write().insert(url, archive);
    }

    /// Opens a connection to given url.
    pub fn open_connection(
        &self,
        url: &ArchiveUrl,
        options: ConnectionOptions,
    ) -> Result<Connection, ConnectionError> {
        if let Some(archive) = self.archives.read().get(url).cloned() {
            return Ok(Connection {
                url: url.clone(),
                archive,
            });
        }

        let error = match self.resolve(url, true) {
            Ok(Some(archive)) => return Ok(self.connected(url, archive)),
            Ok(None) => None,
            Err(error) => Some(error),
        };

        if options.fast_exceptions {
            trace!(%url, "Fast connection failure");
            return Err(ConnectionError::NotFound(url.clone()));
        }

        debug!(%url, ?error, "Cached resolution failed, re-reading from disk");

        match self.resolve(url, false) {
            Ok(Some(archive)) => Ok(self.connected(url, archive)),
            Ok(None) => Err(match error {
                Some(source) => ConnectionError::Archive {
                    url: url.clone(),
                    source,
                },
                None => ConnectionError::NotFound(url.clone()),
            }),
            Err(source) => Err(ConnectionError::Archive {
                url: url.clone(),
                source,
            }),
        }
    }

    fn connected(&self, url: &ArchiveUrl, archive: ArchivePtr) -> Connection {
        self.archives
            .write()
            .entry(url.clone())
            .or_insert_with(|| archive.clone());

        Connection {
            url: url.clone(),
            archive,
        }
    }

    fn resolve(&self, url: &ArchiveUrl, use_cache: bool) -> Result<Option<ArchivePtr>, ArchiveError> {
        match url {
            ArchiveUrl::Directory(path) => Ok(path
                .is_dir()
                .then(|| Arc::new(ExplodedArchive::new(path.clone())) as ArchivePtr)),
            ArchiveUrl::Packaged { root, nested } => {
                let root_url = url.root();
                let cached = use_cache
                    .then(|| self.archives.read().get(&root_url).cloned())
                    .flatten();

                let mut archive = match cached {
                    Some(archive) => archive,
                    None => Arc::new(PackagedArchive::open(root)?) as ArchivePtr,
                };

                for name in nested {
                    archive = match archive.nested_archive(name)? {
                        Some(archive) => archive,
                        None => {
                            return Err(ArchiveError::MissingEntry {
                                url: archive.url(),
                                name: name.clone(),
                            })
                        }
                    };
                }

                Ok(Some(archive))
            }
        }
    }
}
