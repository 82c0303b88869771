//! LMDB-backed index contexts.
//!
//! One environment per repository at `<dataDir>/<key>/index.lmdb`, holding two
//! named databases: `artifacts` maps uinfo to a JSON [`ArtifactRecord`] and
//! `context` keeps the mirrored remote state plus the on-disk format version.
//!
//! Selection streams records in uinfo order, one page per short read
//! transaction, so no transaction outlives a page.

use chrono::DateTime;
use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RwTxn};
use rayon::prelude::*;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use crate::error::{BoxError, Error, Result};
use crate::index::{
    ArtifactRecord, ContextPaths, ContextState, DocumentStream, IndexContext, IndexDocument,
    IndexStore, RecordPredicate, RecordStream,
};
use crate::repo_key::RepoCacheKey;

pub const ARTIFACTS_DB: &str = "artifacts";
pub const CONTEXT_DB: &str = "context";

pub const FORMAT_VERSION: &str = "1";

const KEY_FORMAT_VERSION: &str = "format.version";
const KEY_REPOSITORY_URL: &str = "repository.url";
const KEY_TIMESTAMP: &str = "index.timestamp";
const KEY_CHAIN_ID: &str = "index.chain-id";
const KEY_LAST_INCREMENTAL: &str = "index.last-incremental";

const DEFAULT_MAP_SIZE: usize = 16 * 1024 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 4;
const SELECT_PAGE: usize = 16 * 1024;

type StrDb = Database<Str, Str>;

#[derive(Debug, Clone)]
pub struct LmdbIndexStore {
    map_size: usize,
}

impl Default for LmdbIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LmdbIndexStore {
    pub fn new() -> Self {
        Self {
            map_size: DEFAULT_MAP_SIZE,
        }
    }

    pub fn with_map_size(map_size: usize) -> Self {
        Self { map_size }
    }
}

impl IndexStore for LmdbIndexStore {
    type Context = LmdbContext;

    fn open_context(
        &self,
        key: &RepoCacheKey,
        paths: &ContextPaths,
        repository_url: &str,
    ) -> Result<LmdbContext> {
        let path = paths.index_path.as_path();
        std::fs::create_dir_all(&paths.repo_dir)
            .map_err(access(path, "cannot create context directory"))?;

        let env = open_env(path, self.map_size).map_err(access(path, "cannot open environment"))?;

        let mut wtxn = env.write_txn().map_err(access(path, "cannot begin transaction"))?;
        let artifacts = env
            .create_database::<Str, Str>(&mut wtxn, Some(ARTIFACTS_DB))
            .map_err(access(path, "cannot open artifacts database"))?;
        let meta = env
            .create_database::<Str, Str>(&mut wtxn, Some(CONTEXT_DB))
            .map_err(access(path, "cannot open context database"))?;

        let stored_version = meta
            .get(&wtxn, KEY_FORMAT_VERSION)
            .map_err(access(path, "cannot read format version"))?
            .map(str::to_string);
        match stored_version {
            Some(version) if version != FORMAT_VERSION => {
                return Err(Error::IndexAccess {
                    path: path.to_path_buf(),
                    reason: format!(
                        "on-disk format {version} is not supported (expected {FORMAT_VERSION})"
                    ),
                    source: None,
                });
            }
            Some(_) => {}
            None => meta
                .put(&mut wtxn, KEY_FORMAT_VERSION, FORMAT_VERSION)
                .map_err(access(path, "cannot write format version"))?,
        }
        meta.put(&mut wtxn, KEY_REPOSITORY_URL, repository_url)
            .map_err(access(path, "cannot write repository url"))?;

        let state = read_state(&meta, &wtxn).map_err(access(path, "cannot read context state"))?;
        wtxn.commit().map_err(access(path, "cannot commit context"))?;

        tracing::debug!(path = %path.display(), ?state, "opened index context");
        Ok(LmdbContext {
            id: format!("{}-context", key.as_str()),
            repository_url: repository_url.to_string(),
            path: path.to_path_buf(),
            env,
            artifacts,
            meta,
            state,
            select_page: SELECT_PAGE,
        })
    }

    fn close(&self, context: LmdbContext) -> Result<()> {
        context
            .env
            .force_sync()
            .map_err(access(&context.path, "cannot flush environment"))?;
        tracing::debug!(path = %context.path.display(), "closed index context");
        Ok(())
    }
}

#[derive(Debug)]
pub struct LmdbContext {
    id: String,
    repository_url: String,
    path: PathBuf,
    env: Env,
    artifacts: StrDb,
    meta: StrDb,
    state: ContextState,
    select_page: usize,
}

impl LmdbContext {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn apply(&self, wtxn: &mut RwTxn<'_>, documents: DocumentStream<'_>) -> Result<usize> {
        let mut applied = 0usize;
        for doc in documents {
            match doc? {
                IndexDocument::Artifact { uinfo, record } => {
                    let value = serde_json::to_string(&record)
                        .map_err(access(&self.path, "cannot encode record"))?;
                    self.artifacts
                        .put(wtxn, uinfo.as_str(), value.as_str())
                        .map_err(access(&self.path, "cannot write record"))?;
                }
                IndexDocument::Deleted { uinfo } => {
                    self.artifacts
                        .delete(wtxn, uinfo.as_str())
                        .map_err(access(&self.path, "cannot delete record"))?;
                }
            }
            applied += 1;
        }
        Ok(applied)
    }

    fn write_state(&self, wtxn: &mut RwTxn<'_>, state: &ContextState) -> heed::Result<()> {
        match state.timestamp {
            Some(ts) => self
                .meta
                .put(wtxn, KEY_TIMESTAMP, &ts.timestamp_millis().to_string())?,
            None => {
                self.meta.delete(wtxn, KEY_TIMESTAMP)?;
            }
        }
        match state.chain_id.as_deref() {
            Some(chain) => self.meta.put(wtxn, KEY_CHAIN_ID, chain)?,
            None => {
                self.meta.delete(wtxn, KEY_CHAIN_ID)?;
            }
        }
        match state.last_incremental {
            Some(chunk) => self
                .meta
                .put(wtxn, KEY_LAST_INCREMENTAL, &chunk.to_string())?,
            None => {
                self.meta.delete(wtxn, KEY_LAST_INCREMENTAL)?;
            }
        }
        Ok(())
    }

    /// Runs `fill` and the state update in one write transaction; nothing is
    /// committed if either fails.
    fn write_all<F>(&mut self, state: ContextState, fill: F) -> Result<usize>
    where
        F: FnOnce(&Self, &mut RwTxn<'_>) -> Result<usize>,
    {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(access(&self.path, "cannot begin transaction"))?;
        let applied = fill(&*self, &mut wtxn)?;
        self.write_state(&mut wtxn, &state)
            .map_err(access(&self.path, "cannot write context state"))?;
        wtxn.commit()
            .map_err(access(&self.path, "cannot commit transaction"))?;
        self.state = state;
        Ok(applied)
    }
}

impl IndexContext for LmdbContext {
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
        self.write_all(state, |ctx, wtxn| {
            ctx.artifacts
                .clear(wtxn)
                .map_err(access(&ctx.path, "cannot clear artifacts"))?;
            ctx.apply(wtxn, documents)
        })
    }

    fn merge(&mut self, documents: DocumentStream<'_>, state: ContextState) -> Result<usize> {
        self.write_all(state, |ctx, wtxn| ctx.apply(wtxn, documents))
    }

    fn len(&self) -> Result<u64> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(access(&self.path, "cannot begin read transaction"))?;
        self.artifacts
            .len(&rtxn)
            .map_err(access(&self.path, "cannot count artifacts"))
    }

    fn select<'a>(&'a self, predicate: RecordPredicate<'a>) -> Result<RecordStream<'a>> {
        let mut records = LmdbRecords {
            context: self,
            predicate,
            resume_after: None,
            pending: Vec::new().into_iter(),
            exhausted: false,
        };
        records.next_page()?;
        Ok(Box::new(records))
    }
}

/// Matching records of one context, read a page at a time.
struct LmdbRecords<'a> {
    context: &'a LmdbContext,
    predicate: RecordPredicate<'a>,
    /// Last key of the previous page.
    resume_after: Option<String>,
    pending: std::vec::IntoIter<ArtifactRecord>,
    exhausted: bool,
}

impl LmdbRecords<'_> {
    fn next_page(&mut self) -> Result<()> {
        let ctx = self.context;
        let rtxn = ctx
            .env
            .read_txn()
            .map_err(|err| Error::search("cannot begin read transaction", err))?;
        let lower = match self.resume_after.as_deref() {
            Some(last) => Bound::Excluded(last),
            None => Bound::Unbounded,
        };
        let bounds: (Bound<&str>, Bound<&str>) = (lower, Bound::Unbounded);
        let range = ctx
            .artifacts
            .range(&rtxn, &bounds)
            .map_err(|err| Error::search("cannot iterate artifacts", err))?;

        let mut page: Vec<&str> = Vec::with_capacity(ctx.select_page);
        let mut last_key = None;
        for item in range.take(ctx.select_page) {
            let (key, raw) = item.map_err(|err| Error::search("cannot read artifact", err))?;
            last_key = Some(key);
            page.push(raw);
        }
        self.exhausted = page.len() < ctx.select_page;
        if let Some(key) = last_key {
            self.resume_after = Some(key.to_string());
        }
        self.pending = filter_page(&page, &self.predicate)?.into_iter();
        Ok(())
    }
}

impl Iterator for LmdbRecords<'_> {
    type Item = Result<ArtifactRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.next() {
                return Some(Ok(record));
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.next_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
    }
}

fn filter_page(page: &[&str], predicate: &RecordPredicate<'_>) -> Result<Vec<ArtifactRecord>> {
    let decoded: std::result::Result<Vec<Option<ArtifactRecord>>, serde_json::Error> = page
        .par_iter()
        .map(|raw| {
            serde_json::from_str::<ArtifactRecord>(raw).map(|record| predicate(&record).then_some(record))
        })
        .collect();
    decoded
        .map(|records| records.into_iter().flatten().collect())
        .map_err(|err| Error::search("corrupt record in local index", err))
}

fn read_state(meta: &StrDb, txn: &RwTxn<'_>) -> heed::Result<ContextState> {
    Ok(ContextState {
        timestamp: meta
            .get(txn, KEY_TIMESTAMP)?
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis),
        chain_id: meta.get(txn, KEY_CHAIN_ID)?.map(str::to_string),
        last_incremental: meta
            .get(txn, KEY_LAST_INCREMENTAL)?
            .and_then(|v| v.parse::<u32>().ok()),
    })
}

fn access<'a, E: Into<BoxError>>(path: &'a Path, reason: &'static str) -> impl FnOnce(E) -> Error + 'a {
    move |err| Error::index_access(path, reason, err)
}

fn open_env(path: &Path, map_size: usize) -> heed::Result<Env> {
    let mut options = EnvOpenOptions::new();
    options.map_size(map_size);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: default LMDB locking stays on; NO_SUB_DIR keeps the
    // environment as a single file next to index.properties.
    unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        options.open(path)
    }
}
