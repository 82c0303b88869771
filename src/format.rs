use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::index::ArtifactRecord;

pub const ISO_FORMAT: &str = "ISO";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampFormat {
    EpochMillis,
    Iso,
    /// strftime-style pattern rendered in the local time zone.
    Pattern(String),
}

impl TimestampFormat {
    /// Validates the pattern up front so a typo fails before any query runs.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let Some(raw) = raw.filter(|s| !s.is_empty()) else {
            return Ok(Self::EpochMillis);
        };
        if raw.eq_ignore_ascii_case(ISO_FORMAT) {
            return Ok(Self::Iso);
        }
        let items: Vec<Item<'_>> = StrftimeItems::new(raw).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(Error::Configuration(format!(
                "invalid timestamp format pattern: {raw:?}"
            )));
        }
        // Renders no field at all, e.g. `yyyyMMdd`.
        if !items
            .iter()
            .any(|item| matches!(item, Item::Numeric(..) | Item::Fixed(..)))
        {
            return Err(Error::Configuration(format!(
                "timestamp format pattern {raw:?} has no strftime conversions; use `%` fields such as %Y%m%d%H%M%S"
            )));
        }
        Ok(Self::Pattern(raw.to_string()))
    }

    pub fn render(&self, epoch_millis: i64) -> String {
        let Some(instant) = DateTime::<Utc>::from_timestamp_millis(epoch_millis) else {
            return epoch_millis.to_string();
        };
        match self {
            Self::EpochMillis => epoch_millis.to_string(),
            Self::Iso => instant.to_rfc3339_opts(SecondsFormat::Millis, true),
            Self::Pattern(pattern) => {
                let local = instant.with_timezone(&Local);
                let mut out = String::new();
                match write!(out, "{}", local.format(pattern)) {
                    Ok(()) => out,
                    Err(_) => epoch_millis.to_string(),
                }
            }
        }
    }
}

/// Renders hits as `group:artifact:version:packaging:classifier[:timestamp]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinateFormatter {
    include_timestamp: bool,
    timestamp: TimestampFormat,
}

impl CoordinateFormatter {
    pub fn new(include_timestamp: bool, timestamp_format: Option<&str>) -> Result<Self> {
        Ok(Self {
            include_timestamp,
            timestamp: TimestampFormat::parse(timestamp_format)?,
        })
    }

    pub fn format(&self, record: &ArtifactRecord) -> String {
        let mut out = format!(
            "{}:{}:{}:{}:{}",
            record.group_id,
            record.artifact_id,
            record.version,
            record.packaging.as_deref().unwrap_or(""),
            record.classifier.as_deref().unwrap_or("")
        );
        if self.include_timestamp {
            out.push(':');
            out.push_str(&self.timestamp.render(record.last_modified));
        }
        out
    }
}
