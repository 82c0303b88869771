//! Collaborator contracts around the local index.
//!
//! The freshness controller and the query pipeline only talk to these traits:
//!
//! - [`IndexStore`] opens and closes the per-repository [`IndexContext`]
//! - [`IndexUpdater`] fetches remote index data and merges it into a context
//! - [`SearchEngine`] runs a compiled [`Query`] over one or more contexts
//!
//! [`MemoryContext`] is an in-process context used by tests and by callers
//! that do not want anything on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::query::Query;
use crate::repo_key::RepoCacheKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packaging: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// File extension from the uinfo; older index entries omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Epoch milliseconds.
    pub last_modified: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexDocument {
    Artifact { uinfo: String, record: ArtifactRecord },
    Deleted { uinfo: String },
}

/// What a context remembers about the remote index it mirrors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextState {
    pub timestamp: Option<DateTime<Utc>>,
    pub chain_id: Option<String>,
    pub last_incremental: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ContextPaths {
    pub repo_dir: PathBuf,
    pub index_path: PathBuf,
}

impl ContextPaths {
    pub fn under(repo_dir: PathBuf) -> Self {
        let index_path = repo_dir.join("index.lmdb");
        Self {
            repo_dir,
            index_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub full_update: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

pub type DocumentStream<'a> = &'a mut dyn Iterator<Item = Result<IndexDocument>>;

pub type RecordPredicate<'a> = Arc<dyn Fn(&ArtifactRecord) -> bool + Send + Sync + 'a>;

/// Lazily produced records; anything held open is released on drop.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<ArtifactRecord>> + 'a>;

pub trait IndexContext {
    fn id(&self) -> &str;

    fn repository_url(&self) -> &str;

    fn state(&self) -> &ContextState;

    /// Watermark of the last merged remote index; `None` before the first update.
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.state().timestamp
    }

    /// Drops every record and loads `documents` in their place.
    fn replace_all(&mut self, documents: DocumentStream<'_>, state: ContextState) -> Result<usize>;

    /// Applies upserts and deletions on top of the current records.
    fn merge(&mut self, documents: DocumentStream<'_>, state: ContextState) -> Result<usize>;

    fn len(&self) -> Result<u64>;

    /// Records accepted by `predicate`, in uinfo order.
    fn select<'a>(&'a self, predicate: RecordPredicate<'a>) -> Result<RecordStream<'a>>;
}

pub trait IndexStore {
    type Context: IndexContext;

    fn open_context(
        &self,
        key: &RepoCacheKey,
        paths: &ContextPaths,
        repository_url: &str,
    ) -> Result<Self::Context>;

    fn close(&self, context: Self::Context) -> Result<()>;
}

pub trait IndexUpdater {
    fn fetch_and_merge(&self, context: &mut dyn IndexContext) -> Result<FetchResult>;
}

pub trait SearchEngine {
    fn search<'a>(
        &self,
        query: &'a Query,
        contexts: &[&'a dyn IndexContext],
    ) -> Result<SearchResponse<'a>>;
}

/// Hits of one search, produced as they are consumed. Everything the search
/// held is released on drop, whether or not the hits were fully consumed.
pub struct SearchResponse<'a> {
    hits: RecordStream<'a>,
    seen: u64,
}

impl<'a> SearchResponse<'a> {
    pub fn new(hits: impl Iterator<Item = Result<ArtifactRecord>> + 'a) -> Self {
        Self {
            hits: Box::new(hits),
            seen: 0,
        }
    }

    /// Hits already consumed plus the ones still pending, which get drained.
    pub fn total_hits(mut self) -> Result<u64> {
        while let Some(hit) = self.hits.next() {
            hit?;
            self.seen += 1;
        }
        Ok(self.seen)
    }
}

impl Iterator for SearchResponse<'_> {
    type Item = Result<ArtifactRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let hit = self.hits.next()?;
        if hit.is_ok() {
            self.seen += 1;
        }
        Some(hit)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    id: String,
    repository_url: String,
    state: ContextState,
    records: BTreeMap<String, ArtifactRecord>,
}

impl MemoryContext {
    pub fn new(id: impl Into<String>, repository_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            repository_url: repository_url.into(),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: ContextState) -> Self {
        self.state = state;
        self
    }

    pub fn insert(&mut self, uinfo: impl Into<String>, record: ArtifactRecord) {
        self.records.insert(uinfo.into(), record);
    }

    fn apply(&mut self, documents: DocumentStream<'_>) -> Result<usize> {
        let mut applied = 0usize;
        for doc in documents {
            match doc? {
                IndexDocument::Artifact { uinfo, record } => {
                    self.records.insert(uinfo, record);
                }
                IndexDocument::Deleted { uinfo } => {
                    self.records.remove(&uinfo);
                }
            }
            applied += 1;
        }
        Ok(applied)
    }
}

impl IndexContext for MemoryContext {
    fn id(&self) -> &str {
        &self.id
    }

    fn repository_url(&self) -> &str {
        &self.repository_url
    }

    fn state(&self) -> &ContextState {
        &self.state
    }

    fn replace_all(&mut self, documents: DocumentStream<'_>, state: ContextState) -> Result<usize> {
        let mut fresh = MemoryContext::new(self.id.clone(), self.repository_url.clone());
        let applied = fresh.apply(documents)?;
        self.records = fresh.records;
        self.state = state;
        Ok(applied)
    }

    fn merge(&mut self, documents: DocumentStream<'_>, state: ContextState) -> Result<usize> {
        let mut staged = self.clone();
        let applied = staged.apply(documents)?;
        self.records = staged.records;
        self.state = state;
        Ok(applied)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }

    fn select<'a>(&'a self, predicate: RecordPredicate<'a>) -> Result<RecordStream<'a>> {
        Ok(Box::new(
            self.records
                .values()
                .filter(move |record| predicate(*record))
                .cloned()
                .map(Ok::<ArtifactRecord, Error>),
        ))
    }
}

/// Builds a record from `g:a:v[:packaging[:classifier[:extension]]]`. The
/// extension defaults to the packaging.
#[cfg(test)]
pub(crate) fn record(coordinates: &str, last_modified: i64) -> (String, ArtifactRecord) {
    let parts: Vec<&str> = coordinates.split(':').collect();
    let optional = |idx: usize| {
        parts
            .get(idx)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };
    let record = ArtifactRecord {
        group_id: parts[0].to_string(),
        artifact_id: parts[1].to_string(),
        version: parts[2].to_string(),
        packaging: optional(3),
        classifier: optional(4),
        extension: optional(5).or_else(|| optional(3)),
        last_modified,
    };
    (crate::index_data::uinfo_for(&record), record)
}

#[cfg(test)]
pub(crate) fn all_records(ctx: &dyn IndexContext) -> Result<Vec<ArtifactRecord>> {
    ctx.select(Arc::new(|_: &ArtifactRecord| true))?.collect()
}
