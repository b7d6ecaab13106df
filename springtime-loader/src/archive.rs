//! Browsable containers of named entries. An [Archive] is either exploded on the filesystem
//! ([ExplodedArchive](exploded::ExplodedArchive)) or embedded in a packaged tar stream
//! ([PackagedArchive](packaged::PackagedArchive)). Archives can expose a filtered subset of their
//! entries as nested archives, which is how a single packaged application artifact is turned into a
//! class path.

pub mod exploded;
pub mod handler;
pub mod manifest;
pub mod packaged;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::archive::manifest::Manifest;
use crate::error::ArchiveError;
use bytes::Bytes;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type ArchivePtr = Arc<dyn Archive>;

/// Location of an archive. Packaged archives can be nested arbitrarily deep, with each nested
/// entry name separated by `!/` in the textual form, e.g.
/// `jar:file:/opt/app.jar!/BOOT-INF/lib/a.jar!/`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveUrl {
    Directory(PathBuf),
    Packaged { root: PathBuf, nested: Vec<String> },
}

impl ArchiveUrl {
    /// Url of a root packaged artifact.
    pub fn packaged(root: impl Into<PathBuf>) -> Self {
        Self::Packaged {
            root: root.into(),
            nested: vec![],
        }
    }

    /// Url of a directory on the filesystem.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::Directory(path.into())
    }

    /// Url of an archive nested under given entry name.
    pub fn nested(&self, name: &str) -> Self {
        let name = name.trim_end_matches('/');
        match self {
            Self::Directory(path) => Self::Directory(path.join(name)),
            Self::Packaged { root, nested } => {
                let mut nested = nested.clone();
                nested.push(name.to_string());
                Self::Packaged {
                    root: root.clone(),
                    nested,
                }
            }
        }
    }

    /// Url of the root artifact containing this archive.
    pub fn root(&self) -> Self {
        match self {
            Self::Directory(_) => self.clone(),
            Self::Packaged { root, .. } => Self::packaged(root.clone()),
        }
    }

    #[inline]
    pub fn is_packaged(&self) -> bool {
        matches!(self, Self::Packaged { .. })
    }
}

impl Display for ArchiveUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Directory(path) => write!(f, "file:{}/", path.display()),
            Self::Packaged { root, nested } => {
                write!(f, "jar:file:{}!/", root.display())?;
                for name in nested {
                    write!(f, "{name}!/")?;
                }

                Ok(())
            }
        }
    }
}

/// A single named item in an [Archive]. Directory names always end with `/`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Entry {
    name: String,
    is_directory: bool,
}

impl Entry {
    pub fn new(name: impl Into<String>, is_directory: bool) -> Self {
        Self {
            name: name.into(),
            is_directory,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }
}

/// A browsable, read-only container of named entries.
pub trait Archive: Debug + Send + Sync {
    /// Returns the location of this archive.
    fn url(&self) -> ArchiveUrl;

    /// Returns the `META-INF/MANIFEST.MF` manifest, if present.
    fn manifest(&self) -> Result<Option<Arc<Manifest>>, ArchiveError>;

    /// Returns all entries in archive order.
    fn entries(&self) -> Result<Vec<Entry>, ArchiveError>;

    /// Looks up a single entry by name.
    fn entry(&self, name: &str) -> Result<Option<Entry>, ArchiveError>;

    /// Reads the content of a non-directory entry.
    fn read_entry(&self, name: &str) -> Result<Option<Bytes>, ArchiveError>;

    /// Returns archives for all entries matching given filter, in archive order. Matching
    /// directories become directory archives, matching files are opened as packaged archives.
    fn nested_archives(
        &self,
        filter: &dyn Fn(&Entry) -> bool,
    ) -> Result<Vec<ArchivePtr>, ArchiveError>;

    /// Returns the archive nested under given entry name. The name may omit the trailing `/` of a
    /// directory.
    fn nested_archive(&self, name: &str) -> Result<Option<ArchivePtr>, ArchiveError>;

    /// Checks if this archive is backed by a packaged artifact.
    fn is_packaged(&self) -> bool;

    /// Drops any cached index data. The archive stays usable and will rebuild its caches on next
    /// access.
    fn clear_cache(&self) {}
}

/// Converts a class name to the name of the entry containing its definition.
pub fn class_entry_name(class_name: &str) -> String {
    format!("{}.class", class_name.replace('.', "/"))
}

/// Converts a package name to the name of its directory entry.
pub fn package_entry_name(package_name: &str) -> String {
    format!("{}/", package_name.replace('.', "/"))
}

/// Normalizes a raw entry path to the canonical form used by archives: `/` separated, no leading
/// `./` or `/` and a trailing `/` for directories. Returns `None` for the root itself.
pub(crate) fn normalize_entry_name(raw: &str, is_directory: bool) -> Option<String> {
    let mut name = raw.replace('\\', "/");
    while let Some(stripped) = name.strip_prefix("./") {
        name = stripped.to_string();
    }

    let name = name.trim_start_matches('/').trim_end_matches('/');
    if name.is_empty() || name == "." {
        return None;
    }

    Some(if is_directory {
        format!("{name}/")
    } else {
        name.to_string()
    })
}

/// Checks if an entry name stays within its archive.
pub(crate) fn is_safe_entry_name(name: &str) -> bool {
    !Path::new(name)
        .components()
        .any(|component| !matches!(component, std::path::Component::Normal(_)))
}
