use clap::Parser;
use std::path::PathBuf;

use crate::config::DEFAULTS;

#[derive(Debug, Clone, Parser)]
#[command(name = "mvn-query")]
#[command(about = "Retrieves a Maven repository index and runs a query on it")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Filter by groupId
    #[arg(short = 'g', long = "groupId", value_name = "GROUP")]
    pub group_id: Option<String>,

    /// Filter by artifactId
    #[arg(short = 'a', long = "artifactId", value_name = "ARTIFACT")]
    pub artifact_id: Option<String>,

    /// Filter by packaging type ("-" for any, "" for none)
    #[arg(short = 'p', long, value_name = "TYPE", default_value = DEFAULTS.packaging)]
    pub packaging: String,

    /// Filter by classifier ("-" for any, "" for none)
    #[arg(short = 'c', long, value_name = "CLASSIFIER", default_value = DEFAULTS.classifier)]
    pub classifier: String,

    /// Filter artifacts modified in the last N days (0 disables)
    #[arg(
        short = 'd',
        long = "lastDays",
        value_name = "N",
        default_value_t = DEFAULTS.last_days,
        allow_negative_numbers = true
    )]
    pub last_days: i64,

    /// Data directory for the index [default: ~/.mvnquery]
    #[arg(long = "config-data-dir", value_name = "DIR")]
    pub config_data_dir: Option<PathBuf>,

    /// Repository URL
    #[arg(long = "config-repo", value_name = "URL", default_value = DEFAULTS.repository_url)]
    pub config_repo: String,

    /// Include the lastModified field in query results
    #[arg(short = 't', long = "use-timestamp")]
    pub use_timestamp: bool,

    /// Format of the lastModified field: "iso" or a strftime pattern such as "%Y%m%d%H%M%S%3f"
    #[arg(long = "timestamp-format", value_name = "FORMAT")]
    pub timestamp_format: Option<String>,

    /// Don't print progress
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Update the index even if the update interval has not elapsed
    #[arg(long = "force-update")]
    pub force_update: bool,

    /// Don't update an existing index
    #[arg(long = "skip-update")]
    pub skip_update: bool,

    /// Print version
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}
