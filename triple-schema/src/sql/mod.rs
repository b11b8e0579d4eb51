//! A small typed SQL statement builder.
//!
//! Code generators never format SQL text directly. They assemble [`Statement`]s
//! from validated [`Ident`]s and quoted [`Literal`]s; rendering is the only place
//! text is produced.

pub mod document;
pub mod expr;
pub mod statement;
pub mod types;

pub use document::{Phase, SqlDocument, SqlDocuments};
pub use expr::{AggregateFn, BinaryOp, Expr, Ident, Literal, Select, TableRef};
pub use statement::{
    AddForeignKey, CheckConstraint, ColumnConstraint, ColumnDef, CreateIndex, CreateTable,
    DropTable, IndexMethod, InsertSelect, Statement,
};
pub use types::SqlType;
