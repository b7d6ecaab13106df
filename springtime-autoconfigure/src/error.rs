use springtime_loader::error::ArchiveError;
use thiserror::Error;

/// Errors related to loading auto-configuration metadata.
#[derive(Error, Debug)]
pub enum AutoConfigurationMetadataError {
    #[error("Unable to load auto-configuration metadata from {resource}: {source}")]
    Read {
        resource: String,
        #[source]
        source: ArchiveError,
    },
}
