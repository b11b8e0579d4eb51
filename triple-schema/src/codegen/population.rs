//! Pivoting `INSERT .. SELECT` generation.
//!
//! Triples of a table's instances are grouped by subject; each column takes
//! its value through conditional aggregation on the predicate:
//!
//! ```sql
//! MAX(CASE WHEN pred = '<p>' THEN obj::INTEGER END)           -- scalar
//! BOOL_OR(CASE WHEN pred = '<p>' THEN <bool> END)              -- boolean
//! ARRAY_AGG(obj) FILTER (WHERE pred = '<p>')                   -- array
//! ```
//!
//! The filter keeps other predicates' rows of the same subject out of arrays.

use std::collections::HashMap;

use tracing::debug;

use super::{id_column, prefix_column, subject_column, TripleColumns, TripleSource};
use crate::error::{Result, SchemaError};
use crate::planner::{ColumnPlan, TableDescriptor};
use crate::prefixes::PrefixStrategy;
use crate::sql::{
    AggregateFn, Expr, Ident, InsertSelect, Literal, Phase, Select, SqlDocument, SqlType,
    Statement,
};

/// Emits one `INSERT` per table; union tables select each member in turn.
pub struct PopulationCodeGen<'a> {
    source: &'a TripleSource,
    tables: &'a HashMap<&'a Ident, &'a TableDescriptor>,
}

impl<'a> PopulationCodeGen<'a> {
    /// `tables` resolves reference targets, whose prefixes strip referenced URIs.
    pub fn new(
        source: &'a TripleSource,
        tables: &'a HashMap<&'a Ident, &'a TableDescriptor>,
    ) -> Self {
        Self { source, tables }
    }

    pub fn generate(&self, tables: &[TableDescriptor]) -> Result<SqlDocument> {
        let mut document = SqlDocument::new(Phase::Population);
        for table in tables {
            document.push(Statement::InsertSelect(self.insert(table)?));
        }
        Ok(document)
    }

    pub fn insert(&self, table: &TableDescriptor) -> Result<InsertSelect> {
        let mut columns = vec![id_column(), subject_column(), prefix_column()];
        columns.extend(table.discriminator.iter().cloned());
        columns.extend(table.columns.iter().map(|c| c.name.clone()));

        let values = table
            .columns
            .iter()
            .map(|column| Ok((self.value_expr(column)?, column.name.clone())))
            .collect::<Result<Vec<_>>>()?;

        let mut sources = Vec::with_capacity(table.source_classes.len());
        for (position, class) in table.source_classes.iter().enumerate() {
            let subj = TripleColumns::subj();
            let mut select = Select::from(self.source.table.clone())
                .project_as(table.prefix_strategy.id_expr(subj.clone())?, id_column())
                .project_as(subj.clone(), subject_column())
                .project_as(
                    table.prefix_strategy.prefix_expr(subj.clone())?,
                    prefix_column(),
                );

            if let Some(discriminator) = &table.discriminator {
                let value = table
                    .merge_config
                    .as_ref()
                    .map(|config| config.discriminator_for(&class.class_name))
                    .ok_or_else(|| {
                        SchemaError::internal(format!(
                            "{} has a discriminator but no merge config",
                            table.table_name
                        ))
                    })?;
                select = select.project_as(Expr::string(value)?, discriminator.clone());
            }
            for (value, name) in &values {
                select = select.project_as(value.clone(), name.clone());
            }

            select = select.filter(
                subj.clone()
                    .in_subquery(self.source.subjects_typed_as(&[class.class_uri.as_str()])?),
            );
            // A subject typed as several members belongs to the last one listed.
            let later: Vec<&str> = table.source_classes[position + 1..]
                .iter()
                .map(|c| c.class_uri.as_str())
                .collect();
            if !later.is_empty() {
                select = select
                    .filter(subj.clone().not_in_subquery(self.source.subjects_typed_as(&later)?));
            }
            sources.push(select.group_by(subj));
        }
        debug!(
            table = %table.table_name,
            members = sources.len(),
            columns = columns.len(),
            "Generated population query"
        );

        Ok(InsertSelect {
            table: table.table_name.clone(),
            columns,
            sources,
            on_conflict_do_nothing: false,
        })
    }

    fn value_expr(&self, column: &ColumnPlan) -> Result<Expr> {
        let matches = TripleColumns::pred().eq(Expr::string(column.predicate_uri.as_str())?);
        let value = match &column.target_table {
            Some(target) => self.target_strategy(target)?.id_expr(TripleColumns::obj())?,
            None => typed_value(TripleColumns::obj(), column.resolved_type)?,
        };

        Ok(if column.is_array {
            Expr::aggregate(AggregateFn::ArrayAgg, value).filter(matches)
        } else {
            let func = if column.resolved_type == SqlType::Boolean && !column.is_foreign_key {
                AggregateFn::BoolOr
            } else {
                AggregateFn::Max
            };
            Expr::aggregate(func, Expr::case(vec![(matches, value)], None))
        })
    }

    fn target_strategy(&self, target: &Ident) -> Result<&'a PrefixStrategy> {
        self.tables
            .get(target)
            .copied()
            .map(|table| &table.prefix_strategy)
            .ok_or_else(|| SchemaError::internal(format!("reference to unplanned table {target}")))
    }
}

/// Object value converted to the column type.
fn typed_value(obj: Expr, sql_type: SqlType) -> Result<Expr> {
    Ok(match sql_type {
        SqlType::Text => obj,
        SqlType::Boolean => {
            let truthy = ["true", "1"].map(Literal::new);
            let falsy = ["false", "0"].map(Literal::new);
            let list = |values: [Result<Literal>; 2]| -> Result<Vec<Expr>> {
                values.into_iter().map(|v| v.map(Expr::lit)).collect()
            };
            Expr::case(
                vec![
                    (obj.clone().lower().in_list(list(truthy)?), Expr::Boolean(true)),
                    (obj.lower().in_list(list(falsy)?), Expr::Boolean(false)),
                ],
                None,
            )
        }
        other => obj.cast(other),
    })
}
