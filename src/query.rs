//! Filter compilation.
//!
//! A [`FilterSpec`] holds one [`FieldConstraint`] per coordinate field and an
//! optional recency window. [`compile`] turns it into a [`Query`]: a flat
//! conjunction of clauses, emitted in the fixed order group, artifact,
//! packaging, classifier, then the time range.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Reserved CLI value meaning "do not filter on this field".
pub const UNCONSTRAINED_SENTINEL: &str = "-";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldConstraint {
    #[default]
    Unconstrained,
    MustBeAbsent,
    EqualTo(String),
}

impl FieldConstraint {
    /// `None` or `"-"` leave the field open, `""` requires it to be absent,
    /// anything else must match exactly.
    pub fn from_arg(value: Option<&str>) -> Self {
        match value {
            None => Self::Unconstrained,
            Some(UNCONSTRAINED_SENTINEL) => Self::Unconstrained,
            Some("") => Self::MustBeAbsent,
            Some(v) => Self::EqualTo(v.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub group_id: FieldConstraint,
    pub artifact_id: FieldConstraint,
    pub packaging: FieldConstraint,
    pub classifier: FieldConstraint,
    /// Only records modified within this many days; `<= 0` disables the window.
    pub last_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexField {
    GroupId,
    ArtifactId,
    /// File extension, falling back to the packaging on entries without one.
    Extension,
    Classifier,
}

impl IndexField {
    pub fn key(self) -> &'static str {
        match self {
            Self::GroupId => "g",
            Self::ArtifactId => "a",
            Self::Extension => "e",
            Self::Classifier => "l",
        }
    }
}

pub const LAST_MODIFIED_KEY: &str = "m";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Equals { field: IndexField, value: String },
    Absent { field: IndexField },
    /// `last_modified >= from_millis`, unbounded above.
    ModifiedSince { from_millis: i64 },
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Equals { field, value } => write!(f, "+{}:{value}", field.key()),
            Clause::Absent { field } => write!(f, "-{}:*", field.key()),
            Clause::ModifiedSince { from_millis } => {
                write!(f, "+{LAST_MODIFIED_KEY}:[{from_millis} TO *]")
            }
        }
    }
}

/// Conjunction of clauses; empty matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return f.write_str("*:*");
        }
        for (idx, clause) in self.clauses.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

pub fn compile(spec: &FilterSpec, now: DateTime<Utc>) -> Query {
    let fields = [
        (IndexField::GroupId, &spec.group_id),
        (IndexField::ArtifactId, &spec.artifact_id),
        (IndexField::Extension, &spec.packaging),
        (IndexField::Classifier, &spec.classifier),
    ];

    let mut clauses: Vec<Clause> = fields
        .into_iter()
        .filter_map(|(field, constraint)| match constraint {
            FieldConstraint::Unconstrained => None,
            FieldConstraint::MustBeAbsent => Some(Clause::Absent { field }),
            FieldConstraint::EqualTo(value) => Some(Clause::Equals {
                field,
                value: value.clone(),
            }),
        })
        .collect();

    if spec.last_days > 0 {
        let from = Duration::try_days(spec.last_days)
            .and_then(|window| now.checked_sub_signed(window))
            .map(|from| from.timestamp_millis())
            .unwrap_or(i64::MIN);
        clauses.push(Clause::ModifiedSince { from_millis: from });
    }

    Query { clauses }
}
