//! `CREATE TABLE` generation.

use tracing::debug;

use super::{id_column, prefix_column, subject_column};
use crate::error::Result;
use crate::planner::TableDescriptor;
use crate::sql::{
    CheckConstraint, ColumnConstraint, ColumnDef, CreateTable, DropTable, Expr, Ident, Phase,
    SqlDocument, SqlType, Statement,
};

/// Emits table definitions.
///
/// Every table carries `id` (the subject URI without its prefix), the full
/// `rdf_subject`, the stored `prefix`, and a check that `prefix || id`
/// reproduces `rdf_subject`. Union tables add a discriminator column limited
/// to the configured values. Reference columns are always `TEXT` or `TEXT[]`.
#[derive(Debug, Clone, Copy)]
pub struct SchemaCodeGen {
    drop_existing: bool,
}

impl SchemaCodeGen {
    pub fn new(drop_existing: bool) -> Self {
        Self { drop_existing }
    }

    pub fn generate(&self, tables: &[TableDescriptor]) -> Result<SqlDocument> {
        let mut document = SqlDocument::new(Phase::Schema);
        if self.drop_existing {
            // Dependents are dropped along with each table.
            document.extend(tables.iter().rev().map(|table| {
                Statement::DropTable(DropTable {
                    name: table.table_name.clone(),
                    cascade: true,
                })
            }));
        }
        for table in tables {
            document.push(Statement::CreateTable(self.create_table(table)?));
        }
        Ok(document)
    }

    pub fn create_table(&self, table: &TableDescriptor) -> Result<CreateTable> {
        let text = SqlType::Text.as_sql();
        let mut columns = vec![
            ColumnDef::new(id_column(), text).constraint(ColumnConstraint::PrimaryKey),
            ColumnDef::new(subject_column(), text)
                .constraint(ColumnConstraint::NotNull)
                .constraint(ColumnConstraint::Unique),
            ColumnDef::new(prefix_column(), text).constraint(ColumnConstraint::NotNull),
        ];

        if let (Some(discriminator), Some(config)) = (&table.discriminator, &table.merge_config) {
            let allowed = config
                .allowed_values()
                .into_iter()
                .map(Expr::string)
                .collect::<Result<Vec<_>>>()?;
            columns.push(
                ColumnDef::new(discriminator.clone(), text)
                    .constraint(ColumnConstraint::NotNull)
                    .constraint(ColumnConstraint::Check(
                        Expr::col(discriminator.clone()).in_list(allowed),
                    )),
            );
        }

        for column in &table.columns {
            let data_type = if column.is_foreign_key {
                SqlType::Text.render(column.is_array)
            } else {
                column.rendered_type()
            };
            columns.push(ColumnDef::new(column.name.clone(), data_type));
        }

        let round_trip = CheckConstraint {
            name: Ident::derived(&["ck", table.table_name.as_str(), "uri"])?,
            expr: Expr::col(prefix_column())
                .concat(Expr::col(id_column()))
                .eq(Expr::col(subject_column())),
        };
        debug!(table = %table.table_name, columns = columns.len(), "Generated table definition");

        Ok(CreateTable {
            name: table.table_name.clone(),
            columns,
            checks: vec![round_trip],
        })
    }
}
