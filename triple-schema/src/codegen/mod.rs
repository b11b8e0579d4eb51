//! SQL generation from [`TableDescriptor`]s.
//!
//! | Generator | Document | Statements |
//! |-----------|----------|------------|
//! | [`SchemaCodeGen`] | `schema.sql` | `DROP TABLE`, `CREATE TABLE` with the URI round-trip check |
//! | [`PopulationCodeGen`] | `populate.sql` | one pivoting `INSERT .. SELECT` per table |
//! | [`ForeignKeyCodeGen`] | `foreign_keys.sql` | reference stubs, `ALTER TABLE .. ADD CONSTRAINT` |
//! | [`IndexCodeGen`] | `indexes.sql` | `CREATE INDEX` (GIN for arrays) |
//!
//! All generators read the raw triples from one `(subj, pred, obj)` table.

pub mod foreign_key;
pub mod index;
pub mod population;
pub mod schema;

use std::collections::HashMap;

use tracing::{info, instrument};

pub use foreign_key::ForeignKeyCodeGen;
pub use index::IndexCodeGen;
pub use population::PopulationCodeGen;
pub use schema::SchemaCodeGen;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::naming::{ID_COLUMN, PREFIX_COLUMN, SUBJECT_COLUMN};
use crate::planner::TableDescriptor;
use crate::sql::{Expr, Ident, Select, SqlDocuments};

pub(crate) fn id_column() -> Ident {
    Ident::from_static(ID_COLUMN)
}

pub(crate) fn subject_column() -> Ident {
    Ident::from_static(SUBJECT_COLUMN)
}

pub(crate) fn prefix_column() -> Ident {
    Ident::from_static(PREFIX_COLUMN)
}

/// Column names of the raw triples table.
pub(crate) struct TripleColumns;

impl TripleColumns {
    pub(crate) fn subj() -> Expr {
        Expr::col(Ident::from_static("subj"))
    }

    pub(crate) fn pred() -> Expr {
        Expr::col(Ident::from_static("pred"))
    }

    pub(crate) fn obj() -> Expr {
        Expr::col(Ident::from_static("obj"))
    }
}

/// The raw triples table and its typing predicate.
#[derive(Debug, Clone)]
pub struct TripleSource {
    pub table: Ident,
    pub type_predicate: String,
}

impl TripleSource {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            table: Ident::qualified(config.triples_table.as_str())?,
            type_predicate: config.rdf_type_uri.clone(),
        })
    }

    /// `SELECT subj FROM triples WHERE pred = <type> AND obj IN (<classes>)`
    pub(crate) fn subjects_typed_as(&self, class_uris: &[&str]) -> Result<Select> {
        let mut classes = class_uris
            .iter()
            .map(|uri| Expr::string(*uri))
            .collect::<Result<Vec<_>>>()?;
        let class_filter = if classes.len() == 1 {
            TripleColumns::obj().eq(classes.remove(0))
        } else {
            TripleColumns::obj().in_list(classes)
        };
        Ok(Select::from(self.table.clone())
            .project(TripleColumns::subj())
            .filter(TripleColumns::pred().eq(Expr::string(self.type_predicate.as_str())?))
            .filter(class_filter))
    }
}

/// Runs the four generators over the planned tables.
pub struct CodeGenerator<'a> {
    config: &'a PipelineConfig,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(tables = tables.len()))]
    pub fn generate(&self, tables: &[TableDescriptor]) -> Result<SqlDocuments> {
        let source = TripleSource::from_config(self.config)?;
        let by_name: HashMap<&Ident, &TableDescriptor> =
            tables.iter().map(|t| (&t.table_name, t)).collect();

        let documents = SqlDocuments {
            schema: SchemaCodeGen::new(self.config.drop_existing).generate(tables)?,
            population: PopulationCodeGen::new(&source, &by_name).generate(tables)?,
            foreign_keys: ForeignKeyCodeGen::new(
                &source,
                &by_name,
                self.config.create_reference_stubs,
            )
            .generate(tables)?,
            indexes: IndexCodeGen::new(self.config.index_coverage_threshold).generate(tables)?,
        };
        info!(
            schema = documents.schema.len(),
            population = documents.population.len(),
            foreign_keys = documents.foreign_keys.len(),
            indexes = documents.indexes.len(),
            "Generated SQL documents"
        );
        Ok(documents)
    }
}
