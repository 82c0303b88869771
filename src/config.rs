use std::path::PathBuf;

use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::query::{FieldConstraint, FilterSpec};
use crate::repo_key::RepositoryLocation;

/// Built-in defaults, passed explicitly to whatever needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Defaults {
    pub packaging: &'static str,
    pub classifier: &'static str,
    pub last_days: i64,
    pub data_dir_name: &'static str,
    pub repository_url: &'static str,
    /// Maven Central publishes its index weekly; other sources vary.
    pub update_interval_hours: i64,
}

pub const DEFAULTS: Defaults = Defaults {
    packaging: "jar",
    classifier: "-",
    last_days: 14,
    data_dir_name: ".mvnquery",
    repository_url: "https://repo1.maven.org/maven2",
    update_interval_hours: 48,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFlags {
    pub force_update: bool,
    pub skip_update: bool,
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub repository: RepositoryLocation,
    pub data_dir: PathBuf,
    pub filter: FilterSpec,
    pub flags: UpdateFlags,
    pub use_timestamp: bool,
    pub timestamp_format: Option<String>,
    pub quiet: bool,
    pub defaults: Defaults,
}

impl QueryConfig {
    pub fn from_cli(cli: &Cli, defaults: Defaults) -> Result<Self> {
        if cli.config_repo.trim().is_empty() {
            return Err(Error::Configuration(
                "repository URL must not be empty".to_string(),
            ));
        }
        let data_dir = match cli.config_data_dir.clone() {
            Some(dir) => dir,
            None => default_data_dir(&defaults)?,
        };

        Ok(Self {
            repository: RepositoryLocation::new(cli.config_repo.clone()),
            data_dir,
            filter: FilterSpec {
                group_id: FieldConstraint::from_arg(cli.group_id.as_deref()),
                artifact_id: FieldConstraint::from_arg(cli.artifact_id.as_deref()),
                packaging: FieldConstraint::from_arg(Some(&cli.packaging)),
                classifier: FieldConstraint::from_arg(Some(&cli.classifier)),
                last_days: cli.last_days,
            },
            flags: UpdateFlags {
                force_update: cli.force_update,
                skip_update: cli.skip_update,
            },
            use_timestamp: cli.use_timestamp,
            timestamp_format: cli.timestamp_format.clone(),
            quiet: cli.quiet,
            defaults,
        })
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.repository.repo_dir(&self.data_dir)
    }
}

pub fn default_data_dir(defaults: &Defaults) -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Configuration("failed to resolve home directory".to_string()))?;
    Ok(home.join(defaults.data_dir_name))
}
