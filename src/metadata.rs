//! Per-repository update bookkeeping stored in `<dataDir>/<key>/index.properties`.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::properties::Properties;

pub const FILENAME_INDEX_PROPERTIES: &str = "index.properties";

pub const PROP_LAST_UPDATE_TIMESTAMP: &str = "last.update.timestamp";
pub const PROP_UPDATE_INTERVAL_HOURS: &str = "update.interval.hours";
pub const PROP_REPOSITORY_URL: &str = "repository.url";

const FILE_COMMENT: &str = "mvn-query repository index properties";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMetadata {
    properties: Properties,
}

impl IndexMetadata {
    pub fn path_in(repo_dir: &Path) -> PathBuf {
        repo_dir.join(FILENAME_INDEX_PROPERTIES)
    }

    /// Reads the metadata file; a missing file yields an empty record.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self {
                properties: Properties::parse(&text),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(Error::metadata_io("read index metadata", path, err)),
        }
    }

    /// Rewrites the whole file, creating parent directories as needed.
    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| Error::metadata_io("create directory", parent, err))?;
        }
        std::fs::write(path, self.properties.render(FILE_COMMENT))
            .map_err(|err| Error::metadata_io("write index metadata", path, err))
    }

    /// Last successful update; unparsable values read as absent.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.properties
            .get(PROP_LAST_UPDATE_TIMESTAMP)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn set_last_update(&mut self, at: DateTime<Utc>) {
        self.properties
            .set(PROP_LAST_UPDATE_TIMESTAMP, at.timestamp().to_string());
    }

    pub fn raw_update_interval_hours(&self) -> Option<&str> {
        self.properties.get(PROP_UPDATE_INTERVAL_HOURS)
    }

    pub fn update_interval_hours(&self) -> Option<i64> {
        self.raw_update_interval_hours()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
    }

    pub fn set_update_interval_hours(&mut self, hours: i64) {
        self.properties
            .set(PROP_UPDATE_INTERVAL_HOURS, hours.to_string());
    }

    pub fn repository_url(&self) -> Option<&str> {
        self.properties.get(PROP_REPOSITORY_URL)
    }

    pub fn set_repository_url(&mut self, url: &str) {
        self.properties.set(PROP_REPOSITORY_URL, url);
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}
