use crate::archive::ArchiveUrl;
use crate::entry_point::ErrorPtr;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors related to reading archives and their entries.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Error reading archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed archive {url}: {reason}")]
    Malformed { url: ArchiveUrl, reason: String },
    #[error("Cannot find entry {name} in archive {url}")]
    MissingEntry { url: ArchiveUrl, name: String },
}

/// Errors related to resolving an [ArchiveUrl] to an open archive.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Cannot open connection to {0}")]
    NotFound(ArchiveUrl),
    #[error("Error opening connection to {url}: {source}")]
    Archive {
        url: ArchiveUrl,
        #[source]
        source: ArchiveError,
    },
}

/// Errors related to loading classes.
#[derive(Error, Debug)]
pub enum ClassLoaderError {
    #[error("Class not found: {0}")]
    ClassNotFound(String),
    #[error("Package {0} has already been defined")]
    PackageAlreadyDefined(String),
    #[error("Error reading class {name}: {source}")]
    ClassRead {
        name: String,
        #[source]
        source: ArchiveError,
    },
}

/// Fatal errors aborting the launch sequence.
#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Unable to determine code source archive: {0}")]
    CodeSourceUndetermined(#[source] io::Error),
    #[error("Unable to determine code source archive from {0}")]
    CodeSourceMissing(PathBuf),
    #[error("No manifest found in {0}")]
    MissingManifest(ArchiveUrl),
    #[error("No 'Start-Class' manifest entry specified in {0}")]
    MissingStartClass(ArchiveUrl),
    #[error("No context class loader installed for the current thread")]
    MissingContextClassLoader,
    #[error("Class {0} does not declare an entry point")]
    MainMethodNotFound(String),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    ClassLoader(#[from] ClassLoaderError),
    #[error("Application error: {0}")]
    Application(ErrorPtr),
}
