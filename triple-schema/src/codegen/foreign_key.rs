//! Foreign-key constraint generation.
//!
//! Array columns get no constraint: PostgreSQL cannot enforce a foreign key
//! on the elements of an array column. They are indexed instead.

use std::collections::HashMap;

use tracing::debug;

use super::{id_column, prefix_column, subject_column, TripleColumns, TripleSource};
use crate::error::{Result, SchemaError};
use crate::planner::{ColumnPlan, TableDescriptor};
use crate::sql::{AddForeignKey, Expr, Ident, InsertSelect, Phase, Select, SqlDocument, Statement};

/// Emits reference stubs and `ALTER TABLE .. ADD CONSTRAINT` statements.
pub struct ForeignKeyCodeGen<'a> {
    source: &'a TripleSource,
    tables: &'a HashMap<&'a Ident, &'a TableDescriptor>,
    create_stubs: bool,
}

impl<'a> ForeignKeyCodeGen<'a> {
    pub fn new(
        source: &'a TripleSource,
        tables: &'a HashMap<&'a Ident, &'a TableDescriptor>,
        create_stubs: bool,
    ) -> Self {
        Self {
            source,
            tables,
            create_stubs,
        }
    }

    /// Stubs for every scalar reference column, then every constraint.
    pub fn generate(&self, tables: &[TableDescriptor]) -> Result<SqlDocument> {
        let mut document = SqlDocument::new(Phase::ForeignKeys);
        if self.create_stubs {
            for table in tables {
                for column in table.scalar_foreign_keys() {
                    document.push(Statement::InsertSelect(self.stub_insert(table, column)?));
                }
            }
        }
        for table in tables {
            for column in table.scalar_foreign_keys() {
                document.push(Statement::AddForeignKey(constraint(table, column)?));
            }
            let skipped = table.foreign_keys.len() - table.scalar_foreign_keys().count();
            if skipped > 0 {
                debug!(table = %table.table_name, skipped, "Array reference columns left unconstrained");
            }
        }
        Ok(document)
    }

    /// Inserts a bare row into the target for each referenced URI it lacks.
    ///
    /// Covers references whose target was dropped by polymorphic resolution.
    /// Union targets receive their default discriminator.
    pub fn stub_insert(&self, table: &TableDescriptor, column: &ColumnPlan) -> Result<InsertSelect> {
        let target = self.target(column)?;
        let obj = TripleColumns::obj();
        let strategy = &target.prefix_strategy;

        let mut columns = vec![id_column(), subject_column(), prefix_column()];
        let mut select = Select::from(self.source.table.clone())
            .distinct()
            .project_as(strategy.id_expr(obj.clone())?, id_column())
            .project_as(obj.clone(), subject_column())
            .project_as(strategy.prefix_expr(obj.clone())?, prefix_column());
        if let (Some(discriminator), Some(config)) = (&target.discriminator, &target.merge_config) {
            columns.push(discriminator.clone());
            select = select.project_as(
                Expr::string(config.default_type.as_str())?,
                discriminator.clone(),
            );
        }

        select = select
            .filter(TripleColumns::pred().eq(Expr::string(column.predicate_uri.as_str())?))
            .filter(TripleColumns::subj().in_subquery(
                Select::from(table.table_name.clone()).project(Expr::col(subject_column())),
            ));
        select = select.filter(obj.not_in_subquery(
            Select::from(target.table_name.clone()).project(Expr::col(subject_column())),
        ));

        Ok(InsertSelect {
            table: target.table_name.clone(),
            columns,
            sources: vec![select],
            on_conflict_do_nothing: true,
        })
    }

    fn target(&self, column: &ColumnPlan) -> Result<&'a TableDescriptor> {
        column
            .target_table
            .as_ref()
            .and_then(|target| self.tables.get(target).copied())
            .ok_or_else(|| {
                SchemaError::internal(format!(
                    "reference column {} has no planned target table",
                    column.name
                ))
            })
    }
}

fn constraint(table: &TableDescriptor, column: &ColumnPlan) -> Result<AddForeignKey> {
    let target = column.target_table.clone().ok_or_else(|| {
        SchemaError::internal(format!("column {} is not a reference", column.name))
    })?;
    Ok(AddForeignKey {
        table: table.table_name.clone(),
        constraint: Ident::derived(&["fk", table.table_name.as_str(), column.name.as_str()])?,
        column: column.name.clone(),
        ref_table: target,
        ref_column: id_column(),
    })
}
