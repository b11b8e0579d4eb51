//! Non-fatal data-completeness findings.
//!
//! Each finding is logged when it is recorded and kept for the build report.

use std::fmt;

use serde::Serialize;
use tracing::warn;

/// A recoverable problem found while planning.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Predicate has no type information; the column defaults to TEXT.
    MissingTypeData { table: String, predicate_uri: String },
    /// No cardinality data for a predicate outside the functional set; the column is scalar.
    MissingCardinalityData { table: String, predicate_uri: String },
    /// A reference column points at several tables; only `chosen` keeps a constraint.
    AmbiguousForeignKey {
        table: String,
        column: String,
        chosen: String,
        chosen_count: u64,
        /// `(table, count)` of the targets that were dropped
        discarded: Vec<(String, u64)>,
    },
    /// No known URI prefix; `id` is the full subject URI and `prefix` is empty.
    MissingPrefixData { table: String },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MissingTypeData { .. } => "missing_type_data",
            Diagnostic::MissingCardinalityData { .. } => "missing_cardinality_data",
            Diagnostic::AmbiguousForeignKey { .. } => "ambiguous_foreign_key",
            Diagnostic::MissingPrefixData { .. } => "missing_prefix_data",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingTypeData {
                table,
                predicate_uri,
            } => write!(f, "{table}: no type data for <{predicate_uri}>, using TEXT"),
            Diagnostic::MissingCardinalityData {
                table,
                predicate_uri,
            } => write!(
                f,
                "{table}: no cardinality data for <{predicate_uri}>, using a scalar column"
            ),
            Diagnostic::AmbiguousForeignKey {
                table,
                column,
                chosen,
                chosen_count,
                discarded,
            } => {
                write!(f, "{table}.{column}: references {chosen} ({chosen_count})")?;
                for (target, count) in discarded {
                    write!(f, ", discarded {target} ({count})")?;
                }
                Ok(())
            }
            Diagnostic::MissingPrefixData { table } => {
                write!(f, "{table}: no URI prefix known, id holds the full URI")
            }
        }
    }
}

/// Collector passed through the planning stages.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records and logs a finding.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        warn!(kind = diagnostic.kind(), "{diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of findings of a kind, as returned by [`Diagnostic::kind`].
    pub fn count_of(&self, kind: &str) -> usize {
        self.entries.iter().filter(|d| d.kind() == kind).count()
    }
}
