//! DDL and DML statements rendered by the code generators.

use std::fmt::{self, Display};

use crate::sql::expr::{join, Expr, Ident, Select};

/// A column constraint inside `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraint {
    PrimaryKey,
    NotNull,
    Unique,
    Check(Expr),
}

impl Display for ColumnConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnConstraint::PrimaryKey => f.write_str("PRIMARY KEY"),
            ColumnConstraint::NotNull => f.write_str("NOT NULL"),
            ColumnConstraint::Unique => f.write_str("UNIQUE"),
            ColumnConstraint::Check(expr) => write!(f, "CHECK ({expr})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: Ident,
    /// Rendered type, e.g. `TEXT[]`
    pub data_type: String,
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnDef {
    pub fn new(name: Ident, data_type: impl Into<String>) -> Self {
        Self {
            name,
            data_type: data_type.into(),
            constraints: Vec::new(),
        }
    }

    pub fn constraint(mut self, constraint: ColumnConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

impl Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;
        for constraint in &self.constraints {
            write!(f, " {constraint}")?;
        }
        Ok(())
    }
}

/// A named table-level `CHECK` constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckConstraint {
    pub name: Ident,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: Ident,
    pub columns: Vec<ColumnDef>,
    pub checks: Vec<CheckConstraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTable {
    pub name: Ident,
    pub cascade: bool,
}

/// `INSERT INTO .. (cols) SELECT .. [UNION ALL SELECT ..]`
#[derive(Debug, Clone, PartialEq)]
pub struct InsertSelect {
    pub table: Ident,
    pub columns: Vec<Ident>,
    pub sources: Vec<Select>,
    pub on_conflict_do_nothing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddForeignKey {
    pub table: Ident,
    pub constraint: Ident,
    pub column: Ident,
    pub ref_table: Ident,
    pub ref_column: Ident,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMethod {
    BTree,
    /// Containment and membership queries on array columns
    Gin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    pub name: Ident,
    pub table: Ident,
    pub column: Ident,
    pub method: IndexMethod,
}

/// A complete SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    DropTable(DropTable),
    CreateTable(CreateTable),
    InsertSelect(InsertSelect),
    AddForeignKey(AddForeignKey),
    CreateIndex(CreateIndex),
}

impl Statement {
    /// Table the statement writes to.
    pub fn target_table(&self) -> &Ident {
        match self {
            Statement::DropTable(s) => &s.name,
            Statement::CreateTable(s) => &s.name,
            Statement::InsertSelect(s) => &s.table,
            Statement::AddForeignKey(s) => &s.table,
            Statement::CreateIndex(s) => &s.table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::DropTable(_) => "DROP TABLE",
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::InsertSelect(_) => "INSERT",
            Statement::AddForeignKey(_) => "ALTER TABLE",
            Statement::CreateIndex(_) => "CREATE INDEX",
        }
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::DropTable(s) => {
                let cascade = if s.cascade { " CASCADE" } else { "" };
                write!(f, "DROP TABLE IF EXISTS {}{cascade};", s.name)
            }
            Statement::CreateTable(s) => {
                writeln!(f, "CREATE TABLE {} (", s.name)?;
                let mut lines: Vec<String> = s.columns.iter().map(ToString::to_string).collect();
                lines.extend(
                    s.checks
                        .iter()
                        .map(|c| format!("CONSTRAINT {} CHECK ({})", c.name, c.expr)),
                );
                for (i, line) in lines.iter().enumerate() {
                    let sep = if i + 1 < lines.len() { "," } else { "" };
                    writeln!(f, "    {line}{sep}")?;
                }
                f.write_str(");")
            }
            Statement::InsertSelect(s) => {
                writeln!(f, "INSERT INTO {} ({})", s.table, join(&s.columns, ", "))?;
                let body = s
                    .sources
                    .iter()
                    .map(Select::to_pretty_string)
                    .collect::<Vec<_>>()
                    .join("\nUNION ALL\n");
                f.write_str(&body)?;
                if s.on_conflict_do_nothing {
                    f.write_str("\nON CONFLICT DO NOTHING")?;
                }
                f.write_str(";")
            }
            Statement::AddForeignKey(s) => write!(
                f,
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({});",
                s.table, s.constraint, s.column, s.ref_table, s.ref_column
            ),
            Statement::CreateIndex(s) => match s.method {
                IndexMethod::BTree => write!(
                    f,
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
                    s.name, s.table, s.column
                ),
                IndexMethod::Gin => write!(
                    f,
                    "CREATE INDEX IF NOT EXISTS {} ON {} USING GIN ({});",
                    s.name, s.table, s.column
                ),
            },
        }
    }
}
