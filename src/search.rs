use std::sync::Arc;

use crate::error::Result;
use crate::index::{ArtifactRecord, IndexContext, RecordPredicate, SearchEngine, SearchResponse};
use crate::query::{Clause, IndexField, Query};

/// Evaluates a [`Query`] against every record of each context. Hits are
/// produced lazily, one context after the other.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSearchEngine;

impl ScanSearchEngine {
    pub fn new() -> Self {
        Self
    }
}

impl SearchEngine for ScanSearchEngine {
    fn search<'a>(
        &self,
        query: &'a Query,
        contexts: &[&'a dyn IndexContext],
    ) -> Result<SearchResponse<'a>> {
        let predicate: RecordPredicate<'a> =
            Arc::new(move |record: &ArtifactRecord| matches(query, record));
        let mut streams = Vec::with_capacity(contexts.len());
        for &context in contexts {
            tracing::debug!(
                context = context.id(),
                repository = context.repository_url(),
                %query,
                "searching context"
            );
            streams.push(context.select(Arc::clone(&predicate))?);
        }
        Ok(SearchResponse::new(streams.into_iter().flatten()))
    }
}

pub fn matches(query: &Query, record: &ArtifactRecord) -> bool {
    query.clauses().iter().all(|clause| clause_matches(clause, record))
}

fn clause_matches(clause: &Clause, record: &ArtifactRecord) -> bool {
    match clause {
        Clause::Equals { field, value } => field_value(*field, record) == Some(value.as_str()),
        Clause::Absent { field } => field_value(*field, record).is_none(),
        Clause::ModifiedSince { from_millis } => record.last_modified >= *from_millis,
    }
}

/// Present only when non-empty.
fn field_value(field: IndexField, record: &ArtifactRecord) -> Option<&str> {
    let value = match field {
        IndexField::GroupId => Some(record.group_id.as_str()),
        IndexField::ArtifactId => Some(record.artifact_id.as_str()),
        IndexField::Extension => record
            .extension
            .as_deref()
            .filter(|v| !v.is_empty())
            .or(record.packaging.as_deref()),
        IndexField::Classifier => record.classifier.as_deref(),
    };
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemoryContext, record};
    use crate::query::{FieldConstraint, FilterSpec, compile};
    use chrono::{DateTime, Utc};

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(100 * DAY_MS).unwrap_or_else(Utc::now)
    }

    fn context() -> MemoryContext {
        let mut ctx = MemoryContext::new("central-context", "https://repo1.maven.org/maven2");
        for (coords, modified) in [
            ("com.hazelcast:hazelcast:5.3.0:jar", 99 * DAY_MS),
            ("com.hazelcast:hazelcast:5.3.0:jar:tests", 99 * DAY_MS),
            ("com.hazelcast:hazelcast:5.2.0:jar", 50 * DAY_MS),
            ("com.hazelcast:hazelcast-bom:5.3.0:pom", 99 * DAY_MS),
            ("org.other:hazelcast:1.0:jar", 99 * DAY_MS),
        ] {
            let (uinfo, rec) = record(coords, modified);
            ctx.insert(uinfo, rec);
        }
        ctx
    }

    fn coordinates(response: SearchResponse<'_>) -> Result<Vec<String>> {
        response
            .map(|hit| {
                hit.map(|r| {
                    format!(
                        "{}:{}:{}:{}",
                        r.group_id,
                        r.artifact_id,
                        r.version,
                        r.classifier.unwrap_or_default()
                    )
                })
            })
            .collect()
    }

    #[test]
    fn default_style_filter_excludes_classified_and_stale() -> Result<()> {
        let spec = FilterSpec {
            group_id: FieldConstraint::EqualTo("com.hazelcast".into()),
            artifact_id: FieldConstraint::EqualTo("hazelcast".into()),
            packaging: FieldConstraint::EqualTo("jar".into()),
            classifier: FieldConstraint::MustBeAbsent,
            last_days: 14,
        };
        let ctx = context();
        let query = compile(&spec, now());
        let response = ScanSearchEngine::new().search(&query, &[&ctx])?;
        assert_eq!(coordinates(response)?, vec!["com.hazelcast:hazelcast:5.3.0:"]);
        Ok(())
    }

    #[test]
    fn empty_query_matches_everything() -> Result<()> {
        let ctx = context();
        let query = Query::default();
        let response = ScanSearchEngine::new().search(&query, &[&ctx])?;
        assert_eq!(response.total_hits()?, 5);
        Ok(())
    }

    #[test]
    fn range_lower_bound_is_inclusive() {
        let (_, rec) = record("g:a:1.0:jar", 86 * DAY_MS);
        let spec = FilterSpec {
            last_days: 14,
            ..FilterSpec::default()
        };
        assert!(matches(&compile(&spec, now()), &rec));

        let (_, older) = record("g:a:1.0:jar", 86 * DAY_MS - 1);
        assert!(!matches(&compile(&spec, now()), &older));
    }

    #[test]
    fn empty_field_values_count_as_absent() {
        let (_, mut rec) = record("g:a:1.0:jar", 0);
        rec.classifier = Some(String::new());
        let query = compile(
            &FilterSpec {
                classifier: FieldConstraint::MustBeAbsent,
                ..FilterSpec::default()
            },
            now(),
        );
        assert!(matches(&query, &rec));
    }

    #[test]
    fn hits_from_several_contexts_are_concatenated() -> Result<()> {
        let first = context();
        let mut second = MemoryContext::new("other-context", "http://localhost:5757");
        let (uinfo, rec) = record("com.hazelcast:hazelcast:9.9:jar", 99 * DAY_MS);
        second.insert(uinfo, rec);

        let spec = FilterSpec {
            artifact_id: FieldConstraint::EqualTo("hazelcast".into()),
            classifier: FieldConstraint::MustBeAbsent,
            ..FilterSpec::default()
        };
        let query = compile(&spec, now());
        let mut response = ScanSearchEngine::new().search(&query, &[&first, &second])?;
        let first_hit = response.next().transpose()?;
        assert_eq!(first_hit.map(|r| r.version), Some("5.2.0".to_string()));
        assert_eq!(response.total_hits()?, 4);
        Ok(())
    }

    #[test]
    fn packaging_filter_matches_extension_before_packaging() -> Result<()> {
        let mut ctx = MemoryContext::new("central-context", "https://repo1.maven.org/maven2");
        for coords in [
            "org.apache.felix:org.apache.felix.scr:2.2.0:bundle::jar",
            "org.apache.felix:org.apache.felix.scr:2.2.0:bundle:sources:jar",
            "org.apache.felix:org.apache.felix.scr:2.1.0:bundle",
            "org.apache.felix:org.apache.felix.scr:2.0.0:jar",
        ] {
            let (uinfo, rec) = record(coords, 99 * DAY_MS);
            ctx.insert(uinfo, rec);
        }
        let mut legacy = record("org.apache.felix:org.apache.felix.scr:1.0.0:jar", 99 * DAY_MS).1;
        legacy.extension = None;
        ctx.insert("org.apache.felix|org.apache.felix.scr|1.0.0|NA".to_string(), legacy);

        let spec = FilterSpec {
            packaging: FieldConstraint::EqualTo("jar".into()),
            classifier: FieldConstraint::MustBeAbsent,
            ..FilterSpec::default()
        };
        let query = compile(&spec, now());
        let hits: Vec<ArtifactRecord> =
            ScanSearchEngine::new().search(&query, &[&ctx])?.collect::<Result<_>>()?;
        let listed: Vec<(&str, Option<&str>)> = hits
            .iter()
            .map(|r| (r.version.as_str(), r.packaging.as_deref()))
            .collect();
        assert_eq!(
            listed,
            vec![("1.0.0", Some("jar")), ("2.0.0", Some("jar")), ("2.2.0", Some("bundle"))]
        );
        Ok(())
    }
}
