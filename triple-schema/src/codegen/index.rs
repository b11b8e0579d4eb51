//! `CREATE INDEX` generation.

use crate::error::Result;
use crate::planner::{ColumnPlan, TableDescriptor};
use crate::sql::{CreateIndex, Ident, IndexMethod, Phase, SqlDocument, Statement};

/// Emits at most one index per column: GIN for arrays, B-tree for scalar
/// references, temporal columns and columns at or above the coverage threshold.
#[derive(Debug, Clone, Copy)]
pub struct IndexCodeGen {
    coverage_threshold: f64,
}

impl IndexCodeGen {
    pub fn new(coverage_threshold: f64) -> Self {
        Self { coverage_threshold }
    }

    pub fn generate(&self, tables: &[TableDescriptor]) -> Result<SqlDocument> {
        let mut document = SqlDocument::new(Phase::Indexes);
        for table in tables {
            for column in &table.columns {
                if let Some(method) = self.method_for(column) {
                    document.push(Statement::CreateIndex(CreateIndex {
                        name: Ident::derived(&[
                            "idx",
                            table.table_name.as_str(),
                            column.name.as_str(),
                        ])?,
                        table: table.table_name.clone(),
                        column: column.name.clone(),
                        method,
                    }));
                }
            }
        }
        Ok(document)
    }

    fn method_for(&self, column: &ColumnPlan) -> Option<IndexMethod> {
        if column.is_array {
            Some(IndexMethod::Gin)
        } else if column.is_foreign_key
            || column.resolved_type.is_temporal()
            || column.coverage >= self.coverage_threshold
        {
            Some(IndexMethod::BTree)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::test_tables::*;
    use crate::sql::SqlType;

    #[test]
    fn test_index_selection() {
        let mut common = column("has_name", SqlType::Text, false);
        common.coverage = 95.0;
        let tables = vec![table(
            "ct_data_objects",
            "DataObject",
            vec![
                column("has_keyword", SqlType::Text, true),
                reference("has_spec", "ct_specs", false),
                column("submitted_at", SqlType::TimestampTz, false),
                common,
                column("rare", SqlType::Integer, false),
            ],
        )];
        let doc = IndexCodeGen::new(90.0).generate(&tables).unwrap();
        let rendered: Vec<String> = doc.statements.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "CREATE INDEX IF NOT EXISTS idx_ct_data_objects_has_keyword ON ct_data_objects USING GIN (has_keyword);",
                "CREATE INDEX IF NOT EXISTS idx_ct_data_objects_has_spec ON ct_data_objects (has_spec);",
                "CREATE INDEX IF NOT EXISTS idx_ct_data_objects_submitted_at ON ct_data_objects (submitted_at);",
                "CREATE INDEX IF NOT EXISTS idx_ct_data_objects_has_name ON ct_data_objects (has_name);",
            ]
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut col = column("has_name", SqlType::Text, false);
        col.coverage = 90.0;
        let tables = vec![table("ct_a", "A", vec![col])];
        assert_eq!(IndexCodeGen::new(90.0).generate(&tables).unwrap().len(), 1);
        assert!(IndexCodeGen::new(90.1).generate(&tables).unwrap().is_empty());
    }
}
