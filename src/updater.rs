//! Fetch-and-merge of a repository's published index.
//!
//! The repository publishes `.index/nexus-maven-repository-index.properties`
//! next to the full data file and a rolling window of incremental chunks.
//! A context that is on the same chain and has applied chunk `N` only needs
//! chunks `N+1..`; anything else gets the full file.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::io::Read;

use crate::error::{Error, Result};
use crate::index::{ContextState, FetchResult, IndexContext, IndexDocument, IndexUpdater};
use crate::index_data::IndexDataReader;
use crate::properties::Properties;
use crate::transport::{ResourceFetcher, fetcher_for};

pub const INDEX_DIR: &str = ".index";
pub const INDEX_PROPERTIES_FILE: &str = "nexus-maven-repository-index.properties";
pub const INDEX_FULL_FILE: &str = "nexus-maven-repository-index.gz";

pub const PROP_TIMESTAMP: &str = "nexus.index.timestamp";
pub const PROP_CHAIN_ID: &str = "nexus.index.chain-id";
pub const PROP_LAST_INCREMENTAL: &str = "nexus.index.last-incremental";
pub const PROP_INCREMENTAL_PREFIX: &str = "nexus.index.incremental-";

pub const REMOTE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%.3f %z";

pub fn incremental_file(chunk: u32) -> String {
    format!("nexus-maven-repository-index.{chunk}.gz")
}

/// What the remote properties file announces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteDescriptor {
    pub timestamp: Option<DateTime<Utc>>,
    pub chain_id: Option<String>,
    pub last_incremental: Option<u32>,
    pub incrementals: BTreeSet<u32>,
}

impl RemoteDescriptor {
    pub fn from_properties(props: &Properties) -> Self {
        let incrementals = props
            .iter()
            .filter(|(key, _)| key.starts_with(PROP_INCREMENTAL_PREFIX))
            .filter_map(|(_, value)| value.trim().parse::<u32>().ok())
            .collect();
        Self {
            timestamp: props.get(PROP_TIMESTAMP).and_then(parse_remote_timestamp),
            chain_id: props
                .get(PROP_CHAIN_ID)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            last_incremental: props
                .get(PROP_LAST_INCREMENTAL)
                .and_then(|v| v.trim().parse::<u32>().ok()),
            incrementals,
        }
    }
}

pub fn parse_remote_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, REMOTE_TIMESTAMP_FORMAT)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y%m%d%H%M%S %z"))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub fn format_remote_timestamp(at: DateTime<Utc>) -> String {
    at.format(REMOTE_TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePlan {
    UpToDate,
    Incremental(Vec<u32>),
    Full,
}

pub fn plan_update(local: &ContextState, remote: &RemoteDescriptor) -> UpdatePlan {
    let (Some(local_ts), Some(remote_ts)) = (local.timestamp, remote.timestamp) else {
        return UpdatePlan::Full;
    };
    if remote_ts <= local_ts {
        return UpdatePlan::UpToDate;
    }

    let same_chain = local.chain_id.is_some() && local.chain_id == remote.chain_id;
    match local.last_incremental {
        Some(last)
            if same_chain
                && last.checked_add(1).is_some_and(|next| remote.incrementals.contains(&next)) =>
        {
            UpdatePlan::Incremental(remote.incrementals.range(last + 1..).copied().collect())
        }
        _ => UpdatePlan::Full,
    }
}

pub struct RemoteIndexUpdater {
    fetcher: Box<dyn ResourceFetcher>,
}

impl RemoteIndexUpdater {
    pub fn new(fetcher: Box<dyn ResourceFetcher>) -> Self {
        Self { fetcher }
    }

    pub fn for_repository(repository_url: &str) -> Result<Self> {
        Ok(Self::new(fetcher_for(repository_url)?))
    }

    pub fn fetch_descriptor(&self) -> Result<RemoteDescriptor> {
        let name = index_path(INDEX_PROPERTIES_FILE);
        let mut text = String::new();
        self.fetcher
            .open(&name)?
            .read_to_string(&mut text)
            .map_err(|err| {
                Error::fetch_caused_by(self.fetcher.location(&name), "cannot read index properties", err)
            })?;
        Ok(RemoteDescriptor::from_properties(&Properties::parse(&text)))
    }

    fn open_data(&self, file: &str) -> Result<(String, IndexDataReader<Box<dyn Read>>)> {
        let name = index_path(file);
        let location = self.fetcher.location(&name);
        let reader = IndexDataReader::new(self.fetcher.open(&name)?)
            .map_err(|err| Error::fetch_caused_by(&location, "invalid index data", err))?;
        Ok((location, reader))
    }

    fn full_update(
        &self,
        context: &mut dyn IndexContext,
        remote: &RemoteDescriptor,
    ) -> Result<FetchResult> {
        let (location, reader) = self.open_data(INDEX_FULL_FILE)?;
        tracing::debug!(%location, "downloading full index");
        let timestamp = remote.timestamp.or(reader.timestamp());
        let state = ContextState {
            timestamp,
            chain_id: remote.chain_id.clone(),
            last_incremental: remote.last_incremental,
        };
        let mut docs = documents(reader, &location);
        let loaded = context.replace_all(&mut docs, state)?;
        tracing::debug!(loaded, "full index loaded");
        Ok(FetchResult {
            full_update: true,
            timestamp,
        })
    }

    fn incremental_update(
        &self,
        context: &mut dyn IndexContext,
        remote: &RemoteDescriptor,
        chunks: &[u32],
    ) -> Result<FetchResult> {
        for (idx, &chunk) in chunks.iter().enumerate() {
            let (location, reader) = self.open_data(&incremental_file(chunk))?;
            tracing::debug!(%location, chunk, "applying incremental chunk");
            // After the last chunk the descriptor's timestamp is the watermark.
            let timestamp = if idx + 1 == chunks.len() {
                remote.timestamp.or(reader.timestamp())
            } else {
                reader.timestamp().or(remote.timestamp)
            };
            let state = ContextState {
                timestamp,
                chain_id: remote.chain_id.clone(),
                last_incremental: Some(chunk),
            };
            let mut docs = documents(reader, &location);
            context.merge(&mut docs, state)?;
        }

        Ok(FetchResult {
            full_update: false,
            timestamp: remote.timestamp,
        })
    }
}

impl IndexUpdater for RemoteIndexUpdater {
    fn fetch_and_merge(&self, context: &mut dyn IndexContext) -> Result<FetchResult> {
        let remote = self.fetch_descriptor()?;
        match plan_update(context.state(), &remote) {
            UpdatePlan::UpToDate => Ok(FetchResult {
                full_update: false,
                timestamp: context.timestamp(),
            }),
            UpdatePlan::Incremental(chunks) => self.incremental_update(context, &remote, &chunks),
            UpdatePlan::Full => self.full_update(context, &remote),
        }
    }
}

fn index_path(file: &str) -> String {
    format!("{INDEX_DIR}/{file}")
}

fn documents<'a, R: Read + 'a>(
    reader: IndexDataReader<R>,
    location: &'a str,
) -> impl Iterator<Item = Result<IndexDocument>> + 'a {
    reader.map(move |doc| {
        doc.map_err(|err| Error::fetch_caused_by(location, "corrupt index data", err))
    })
}
