//! The four generated SQL documents and their execution phases.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{ErrorContext, Result};
use crate::sql::statement::Statement;

/// Execution phase of a generated document. Phases run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Schema,
    Population,
    ForeignKeys,
    Indexes,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 4] = [
        Phase::Schema,
        Phase::Population,
        Phase::ForeignKeys,
        Phase::Indexes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Schema => "schema",
            Phase::Population => "population",
            Phase::ForeignKeys => "foreign_keys",
            Phase::Indexes => "indexes",
        }
    }

    /// File name used by [`SqlDocuments::write_to_dir`].
    pub fn file_name(&self) -> &'static str {
        match self {
            Phase::Schema => "schema.sql",
            Phase::Population => "populate.sql",
            Phase::ForeignKeys => "foreign_keys.sql",
            Phase::Indexes => "indexes.sql",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered list of statements belonging to one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlDocument {
    pub phase: Phase,
    pub statements: Vec<Statement>,
}

impl SqlDocument {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            statements: Vec::new(),
        }
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn extend(&mut self, statements: impl IntoIterator<Item = Statement>) {
        self.statements.extend(statements);
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Renders the document as a SQL script.
    pub fn render(&self) -> String {
        let mut out = format!(
            "-- Generated by triple-schema: {} phase ({} statements)\n",
            self.phase,
            self.statements.len()
        );
        if self.phase == Phase::Schema {
            out.push_str("-- WARNING: drops and recreates every generated table\n");
        }
        for statement in &self.statements {
            out.push('\n');
            out.push_str(&statement.to_string());
            out.push('\n');
        }
        out
    }
}

/// The schema, population, foreign-key and index documents of one build.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlDocuments {
    pub schema: SqlDocument,
    pub population: SqlDocument,
    pub foreign_keys: SqlDocument,
    pub indexes: SqlDocument,
}

impl Default for SqlDocuments {
    fn default() -> Self {
        Self {
            schema: SqlDocument::new(Phase::Schema),
            population: SqlDocument::new(Phase::Population),
            foreign_keys: SqlDocument::new(Phase::ForeignKeys),
            indexes: SqlDocument::new(Phase::Indexes),
        }
    }
}

impl SqlDocuments {
    pub fn get(&self, phase: Phase) -> &SqlDocument {
        match phase {
            Phase::Schema => &self.schema,
            Phase::Population => &self.population,
            Phase::ForeignKeys => &self.foreign_keys,
            Phase::Indexes => &self.indexes,
        }
    }

    /// Documents in execution order.
    pub fn in_order(&self) -> impl Iterator<Item = &SqlDocument> {
        Phase::ALL.into_iter().map(move |phase| self.get(phase))
    }

    pub fn total_statements(&self) -> usize {
        self.in_order().map(SqlDocument::len).sum()
    }

    /// Writes one `.sql` file per phase into `dir`, creating it if needed.
    #[instrument(skip_all)]
    pub async fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating output directory {}", dir.display()))?;

        let mut written = Vec::with_capacity(Phase::ALL.len());
        for document in self.in_order() {
            let path = dir.join(document.phase.file_name());
            tokio::fs::write(&path, document.render())
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!(
                path = %path.display(),
                statements = document.len(),
                "Wrote SQL document"
            );
            written.push(path);
        }
        Ok(written)
    }
}
