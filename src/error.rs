use std::path::PathBuf;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to {action} {}", path.display())]
    MetadataIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open index context at {}: {reason}", path.display())]
    IndexAccess {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("index fetch from {location} failed: {reason}")]
    Fetch {
        location: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("search failed: {reason}")]
    Search {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("failed to write query results")]
    Output(#[source] std::io::Error),
}

impl Error {
    pub fn metadata_io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::MetadataIo {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn index_access(
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::IndexAccess {
            path: path.into(),
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub fn fetch(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            location: location.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub fn fetch_caused_by(
        location: impl Into<String>,
        reason: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Fetch {
            location: location.into(),
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub fn search(reason: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Search {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }
}
