//! The query pipeline: open the repository's context, refresh it when due,
//! run the compiled filter and write one coordinate line per hit.

use chrono::Utc;
use std::io::Write;
use std::time::Instant;

use crate::config::QueryConfig;
use crate::error::{Error, Result};
use crate::format::CoordinateFormatter;
use crate::freshness::{FreshnessController, UpdateOutcome};
use crate::index::{ContextPaths, IndexStore, IndexUpdater, SearchEngine};
use crate::query::compile;
use crate::search::ScanSearchEngine;
use crate::store::LmdbIndexStore;
use crate::updater::RemoteIndexUpdater;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySummary {
    pub outcome: UpdateOutcome,
    pub total_hits: u64,
    pub listed: u64,
}

pub struct MvnQuery<S = LmdbIndexStore> {
    config: QueryConfig,
    formatter: CoordinateFormatter,
    store: S,
    updater: Box<dyn IndexUpdater>,
    search: Box<dyn SearchEngine>,
}

impl MvnQuery<LmdbIndexStore> {
    pub fn new(config: QueryConfig) -> Result<Self> {
        let updater = RemoteIndexUpdater::for_repository(config.repository.as_str())?;
        Self::with_collaborators(
            config,
            LmdbIndexStore::new(),
            Box::new(updater),
            Box::new(ScanSearchEngine::new()),
        )
    }
}

impl<S: IndexStore> MvnQuery<S> {
    /// Fails early on an invalid timestamp pattern, before anything touches disk.
    pub fn with_collaborators(
        config: QueryConfig,
        store: S,
        updater: Box<dyn IndexUpdater>,
        search: Box<dyn SearchEngine>,
    ) -> Result<Self> {
        let formatter =
            CoordinateFormatter::new(config.use_timestamp, config.timestamp_format.as_deref())?;
        Ok(Self {
            config,
            formatter,
            store,
            updater,
            search,
        })
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn perform(&self, out: &mut impl Write) -> Result<QuerySummary> {
        tracing::info!(
            "Use --quiet (-q) argument to suppress the debug output. Use --help (-h) to print the help."
        );

        let repository = &self.config.repository;
        tracing::info!("Initiating indexing context for {repository}");
        let paths = ContextPaths::under(self.config.repo_dir());
        tracing::info!("\t- repository index data location: {}", paths.repo_dir.display());
        if !paths.repo_dir.exists() {
            tracing::info!("\t- creating index data directory");
            std::fs::create_dir_all(&paths.repo_dir)
                .map_err(|err| Error::metadata_io("create directory", &paths.repo_dir, err))?;
        }

        let mut context =
            self.store
                .open_context(&repository.cache_key(), &paths, repository.as_str())?;
        let result = self.run(&mut context, out);
        let closed = self.store.close(context);
        let summary = result?;
        closed?;
        Ok(summary)
    }

    fn run(&self, context: &mut S::Context, out: &mut impl Write) -> Result<QuerySummary> {
        let controller = FreshnessController::new(
            self.config.repository.clone(),
            &self.config.data_dir,
            &self.config.defaults,
        );
        let outcome = controller.ensure_fresh(&self.config.flags, context, self.updater.as_ref())?;

        tracing::info!("Building the query");
        let query = compile(&self.config.filter, Utc::now());
        tracing::info!("\t{query}");

        tracing::info!("Querying index");
        tracing::info!("------");
        let started = Instant::now();
        let mut response = self.search.search(&query, &[&*context])?;
        let mut listed = 0u64;
        for hit in response.by_ref() {
            let record = hit?;
            writeln!(out, "{}", self.formatter.format(&record)).map_err(Error::Output)?;
            listed += 1;
        }
        out.flush().map_err(Error::Output)?;
        let total_hits = response.total_hits()?;

        tracing::info!("------");
        tracing::info!("Total response size: {total_hits}");
        tracing::info!("Artifacts listed: {listed}");
        tracing::info!("Query took {} seconds", started.elapsed().as_secs());

        Ok(QuerySummary {
            outcome,
            total_hits,
            listed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::config::DEFAULTS;
    use crate::index::{
        ContextState, FetchResult, IndexContext, IndexDocument, MemoryContext, record,
    };
    use crate::repo_key::RepoCacheKey;
    use chrono::{DateTime, Duration};
    use clap::Parser;
    use std::cell::RefCell;
    use std::path::Path;

    /// Hands out an in-memory context and records what got closed.
    #[derive(Default)]
    struct MemoryStore {
        closed: RefCell<Vec<usize>>,
    }

    impl IndexStore for MemoryStore {
        type Context = MemoryContext;

        fn open_context(
            &self,
            key: &RepoCacheKey,
            _paths: &ContextPaths,
            repository_url: &str,
        ) -> Result<MemoryContext> {
            Ok(MemoryContext::new(key.as_str(), repository_url))
        }

        fn close(&self, context: MemoryContext) -> Result<()> {
            self.closed.borrow_mut().push(context.len()? as usize);
            Ok(())
        }
    }

    struct CentralSnapshot;

    impl IndexUpdater for CentralSnapshot {
        fn fetch_and_merge(&self, context: &mut dyn IndexContext) -> Result<FetchResult> {
            let recent = (Utc::now() - Duration::days(1)).timestamp_millis();
            let mut docs = [
                ("com.hazelcast:hazelcast:3.12.13:jar", recent),
                ("com.hazelcast:hazelcast:3.12.13:jar:tests", recent),
                ("com.hazelcast:hazelcast-client:3.12.13:jar", recent),
                ("com.hazelcast:hazelcast:3.12.12:jar", 1_000_000_000_000),
            ]
            .into_iter()
            .map(|(coords, modified)| {
                let (uinfo, record) = record(coords, modified);
                Ok::<_, Error>(IndexDocument::Artifact { uinfo, record })
            });
            let state = ContextState {
                timestamp: DateTime::from_timestamp_millis(recent),
                ..ContextState::default()
            };
            context.replace_all(&mut docs, state.clone())?;
            Ok(FetchResult {
                full_update: true,
                timestamp: state.timestamp,
            })
        }
    }

    fn config(data_dir: &Path, extra: &[&str]) -> Result<QueryConfig> {
        let dir = data_dir.display().to_string();
        let mut argv = vec![
            "mvn-query",
            "--config-data-dir",
            dir.as_str(),
            "--config-repo",
            "http://localhost:5757",
            "-g",
            "com.hazelcast",
            "-a",
            "hazelcast",
        ];
        argv.extend_from_slice(extra);
        QueryConfig::from_cli(&Cli::parse_from(argv), DEFAULTS)
    }

    fn query(config: QueryConfig) -> Result<MvnQuery<MemoryStore>> {
        MvnQuery::with_collaborators(
            config,
            MemoryStore::default(),
            Box::new(CentralSnapshot),
            Box::new(ScanSearchEngine::new()),
        )
    }

    #[test]
    fn first_run_updates_lists_hits_and_closes_context() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let app = query(config(dir.path(), &["-c", "", "-d", "0", "-t", "--timestamp-format", "%Y"])?)?;

        let mut out = Vec::new();
        let summary = app.perform(&mut out)?;

        assert_eq!(summary.outcome, UpdateOutcome::FullUpdate);
        assert_eq!(summary.total_hits, 2);
        assert_eq!(summary.listed, 2);
        let text = String::from_utf8(out)?;
        assert!(text.contains("com.hazelcast:hazelcast:3.12.13:jar::"));
        assert!(text.contains("com.hazelcast:hazelcast:3.12.12:jar::2001"));
        assert!(!text.contains("hazelcast-client"));
        assert!(!text.contains(":tests"));

        assert!(dir.path().join("crcaNi7JcZ/index.properties").is_file());
        assert_eq!(*app.store.closed.borrow(), vec![4]);
        Ok(())
    }

    #[test]
    fn recency_window_applies_by_default() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let app = query(config(dir.path(), &["-c", ""])?)?;
        let mut out = Vec::new();
        let summary = app.perform(&mut out)?;
        assert_eq!(summary.listed, 1);
        assert_eq!(String::from_utf8(out)?, "com.hazelcast:hazelcast:3.12.13:jar:\n");
        Ok(())
    }

    #[test]
    fn invalid_timestamp_pattern_fails_before_any_io() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = query(config(dir.path(), &["-t", "--timestamp-format", "%Y-%"])?)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(!dir.path().join("crcaNi7JcZ").exists());
        Ok(())
    }

    #[test]
    fn write_failure_is_an_output_error_and_context_is_still_closed() -> anyhow::Result<()> {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("pipe closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let dir = tempfile::tempdir()?;
        let app = query(config(dir.path(), &["-d", "0"])?)?;
        let err = app.perform(&mut Broken).err().unwrap();
        assert!(matches!(err, Error::Output(_)));
        assert_eq!(app.store.closed.borrow().len(), 1);
        Ok(())
    }
}
