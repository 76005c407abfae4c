// Metadata error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Invalid documentation index: {0}")]
    InvalidDocumentation(String),

    #[error("Failed to read documentation file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata handler is not attached to a router")]
    NotAttached,
}

impl From<MetadataError> for switchyard_core::Error {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotAttached => switchyard_core::Error::Configuration(err.to_string()),
            other => switchyard_core::Error::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
