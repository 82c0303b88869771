//! Decides whether the local index must be refreshed before querying.
//!
//! Precedence of the decision, first match wins:
//!
//! 1. `--force-update`, or a context that never received any data: update
//! 2. `--skip-update`: no update
//! 3. no recorded last update: update
//! 4. update once `last update + interval` lies in the past
//!
//! After a successful update `index.properties` records the run's start time
//! and the repository URL.

use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{Defaults, UpdateFlags};
use crate::error::Result;
use crate::index::{IndexContext, IndexUpdater};
use crate::metadata::IndexMetadata;
use crate::repo_key::RepositoryLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    Required,
    NotRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Skipped,
    FullUpdate,
    IncrementalUpdate {
        from: Option<DateTime<Utc>>,
        to: DateTime<Utc>,
    },
    UpToDate,
}

impl UpdateOutcome {
    pub fn fetched(&self) -> bool {
        !matches!(self, UpdateOutcome::Skipped)
    }
}

pub fn decide(
    flags: &UpdateFlags,
    has_prior_data: bool,
    last_update: Option<DateTime<Utc>>,
    interval_hours: i64,
    now: DateTime<Utc>,
) -> UpdateDecision {
    if flags.force_update || !has_prior_data {
        return UpdateDecision::Required;
    }
    if flags.skip_update {
        return UpdateDecision::NotRequired;
    }
    let Some(last_update) = last_update else {
        return UpdateDecision::Required;
    };
    let next_allowed = Duration::try_hours(interval_hours)
        .and_then(|interval| last_update.checked_add_signed(interval));
    match next_allowed {
        Some(next_allowed) if now <= next_allowed => UpdateDecision::NotRequired,
        Some(_) => UpdateDecision::Required,
        // Interval too large to represent: never due.
        None if interval_hours > 0 => UpdateDecision::NotRequired,
        None => UpdateDecision::Required,
    }
}

#[derive(Debug, Clone)]
pub struct FreshnessController {
    repository: RepositoryLocation,
    metadata_path: PathBuf,
    default_interval_hours: i64,
}

impl FreshnessController {
    pub fn new(repository: RepositoryLocation, data_dir: &Path, defaults: &Defaults) -> Self {
        let metadata_path = IndexMetadata::path_in(&repository.repo_dir(data_dir));
        Self {
            repository,
            metadata_path,
            default_interval_hours: defaults.update_interval_hours,
        }
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    pub fn ensure_fresh(
        &self,
        flags: &UpdateFlags,
        context: &mut dyn IndexContext,
        updater: &dyn IndexUpdater,
    ) -> Result<UpdateOutcome> {
        self.ensure_fresh_at(Utc::now(), flags, context, updater)
    }

    pub fn ensure_fresh_at(
        &self,
        now: DateTime<Utc>,
        flags: &UpdateFlags,
        context: &mut dyn IndexContext,
        updater: &dyn IndexUpdater,
    ) -> Result<UpdateOutcome> {
        let mut metadata = IndexMetadata::load(&self.metadata_path)?;

        let interval_hours = metadata
            .update_interval_hours()
            .unwrap_or(self.default_interval_hours);
        let interval_normalized =
            metadata.raw_update_interval_hours() != Some(interval_hours.to_string().as_str());
        metadata.set_update_interval_hours(interval_hours);

        let previous_watermark = context.timestamp();
        let decision = decide(
            flags,
            previous_watermark.is_some(),
            metadata.last_update(),
            interval_hours,
            now,
        );

        if decision == UpdateDecision::NotRequired {
            tracing::info!("Skipping index update (not needed or explicitly suppressed)");
            if interval_normalized && self.metadata_path.exists() {
                metadata.store(&self.metadata_path)?;
            }
            return Ok(UpdateOutcome::Skipped);
        }

        tracing::info!("Updating Index ...");
        tracing::info!("\tThis might take a while on first run, so please be patient!");
        let started = Instant::now();

        let result = updater.fetch_and_merge(context)?;
        let outcome = if result.full_update {
            tracing::info!("\tFull update happened!");
            UpdateOutcome::FullUpdate
        } else {
            match result.timestamp {
                Some(to) if Some(to) != previous_watermark => {
                    tracing::info!(
                        "\tIncremental update happened, change covered {} - {} period.",
                        describe(previous_watermark),
                        to
                    );
                    UpdateOutcome::IncrementalUpdate {
                        from: previous_watermark,
                        to,
                    }
                }
                _ => {
                    tracing::info!("\tNo update needed, index is up to date!");
                    UpdateOutcome::UpToDate
                }
            }
        };

        metadata.set_last_update(now);
        metadata.set_repository_url(self.repository.as_str());
        metadata.store(&self.metadata_path)?;

        tracing::info!("\tFinished in {} sec", started.elapsed().as_secs());
        Ok(outcome)
    }
}

fn describe(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_string())
        .unwrap_or_else(|| "(none)".to_string())
}
