//! Typed SQL expressions and queries.
//!
//! Only validated [`Ident`]s and quoted [`Literal`]s can reach the rendered text;
//! there is no way to splice raw strings into an expression.

use std::fmt::{self, Display, Write as _};

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::security::{SqlSecurity, MAX_IDENTIFIER_LENGTH};
use crate::sql::types::SqlType;

/// A validated SQL identifier, safe to emit unquoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    /// Validates `name` as a bare identifier.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        SqlSecurity::validate_identifier(&name)?;
        Ok(Self(name))
    }

    /// Validates a possibly schema-qualified name such as `public.rdf_triples`.
    pub fn qualified(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        SqlSecurity::validate_qualified_name(&name)?;
        Ok(Self(name))
    }

    /// Builds a derived object name (constraint, index) from its parts.
    ///
    /// Names longer than the identifier limit are cut and suffixed with a short
    /// digest of the full name, so distinct inputs keep distinct names.
    pub fn derived(parts: &[&str]) -> Result<Self> {
        let full = parts.join("_");
        if full.len() <= MAX_IDENTIFIER_LENGTH {
            return Self::new(full);
        }
        let digest = hex::encode(Sha256::digest(full.as_bytes()));
        let suffix = &digest[..8];
        let mut keep = MAX_IDENTIFIER_LENGTH - suffix.len() - 1;
        while !full.is_char_boundary(keep) {
            keep -= 1;
        }
        let head = full[..keep].trim_end_matches('_');
        Self::new(format!("{head}_{suffix}"))
    }

    /// Identifier for a name known at compile time.
    pub(crate) fn from_static(name: &'static str) -> Self {
        debug_assert!(SqlSecurity::validate_identifier(name).is_ok());
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Ident {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A quoted SQL string literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    value: String,
    quoted: String,
}

impl Literal {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let quoted = SqlSecurity::quote_literal(&value)?;
        Ok(Self { value, quoted })
    }

    /// The unquoted value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Length in characters, as SQL string functions count it.
    pub fn char_len(&self) -> usize {
        self.value.chars().count()
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    And,
    Or,
    Concat,
}

impl BinaryOp {
    fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Max,
    BoolOr,
    ArrayAgg,
    Count,
}

impl AggregateFn {
    fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Max => "MAX",
            AggregateFn::BoolOr => "BOOL_OR",
            AggregateFn::ArrayAgg => "ARRAY_AGG",
            AggregateFn::Count => "COUNT",
        }
    }
}

/// A SQL scalar or aggregate expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(Ident),
    QualifiedColumn(Ident, Ident),
    Literal(Literal),
    Integer(i64),
    Boolean(bool),
    Null,
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Select>,
        negated: bool,
    },
    Exists {
        subquery: Box<Select>,
        negated: bool,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        data_type: SqlType,
    },
    Lower(Box<Expr>),
    /// `LEFT(expr, n)`
    Left {
        expr: Box<Expr>,
        len: usize,
    },
    /// `SUBSTRING(expr FROM n)`, 1-based
    Substring {
        expr: Box<Expr>,
        from: usize,
    },
    Aggregate {
        func: AggregateFn,
        arg: Box<Expr>,
        filter: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn col(name: Ident) -> Self {
        Expr::Column(name)
    }

    pub fn qualified(table: Ident, column: Ident) -> Self {
        Expr::QualifiedColumn(table, column)
    }

    pub fn lit(value: Literal) -> Self {
        Expr::Literal(value)
    }

    /// String literal built from an arbitrary value.
    pub fn string(value: impl Into<String>) -> Result<Self> {
        Literal::new(value).map(Expr::Literal)
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(self, right: Expr) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn not_eq(self, right: Expr) -> Self {
        self.binary(BinaryOp::NotEq, right)
    }

    pub fn and(self, right: Expr) -> Self {
        self.binary(BinaryOp::And, right)
    }

    pub fn or(self, right: Expr) -> Self {
        self.binary(BinaryOp::Or, right)
    }

    pub fn concat(self, right: Expr) -> Self {
        self.binary(BinaryOp::Concat, right)
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, list: Vec<Expr>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    pub fn in_subquery(self, subquery: Select) -> Self {
        Expr::InSubquery {
            expr: Box::new(self),
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    pub fn not_in_subquery(self, subquery: Select) -> Self {
        Expr::InSubquery {
            expr: Box::new(self),
            subquery: Box::new(subquery),
            negated: true,
        }
    }

    pub fn not_exists(subquery: Select) -> Self {
        Expr::Exists {
            subquery: Box::new(subquery),
            negated: true,
        }
    }

    pub fn cast(self, data_type: SqlType) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            data_type,
        }
    }

    pub fn lower(self) -> Self {
        Expr::Lower(Box::new(self))
    }

    pub fn left(self, len: usize) -> Self {
        Expr::Left {
            expr: Box::new(self),
            len,
        }
    }

    pub fn substring_from(self, from: usize) -> Self {
        Expr::Substring {
            expr: Box::new(self),
            from,
        }
    }

    /// `CASE WHEN .. THEN .. [ELSE ..] END`
    pub fn case(branches: Vec<(Expr, Expr)>, otherwise: Option<Expr>) -> Self {
        Expr::Case {
            branches,
            otherwise: otherwise.map(Box::new),
        }
    }

    pub fn aggregate(func: AggregateFn, arg: Expr) -> Self {
        Expr::Aggregate {
            func,
            arg: Box::new(arg),
            filter: None,
        }
    }

    /// Restricts an aggregate with `FILTER (WHERE ..)`. No-op on other expressions.
    pub fn filter(self, predicate: Expr) -> Self {
        match self {
            Expr::Aggregate { func, arg, .. } => Expr::Aggregate {
                func,
                arg,
                filter: Some(Box::new(predicate)),
            },
            other => other,
        }
    }

    /// Folds expressions with `AND`; `None` when empty.
    pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(Expr::and)
    }

    fn is_atomic(&self) -> bool {
        matches!(
            self,
            Expr::Column(_)
                | Expr::QualifiedColumn(..)
                | Expr::Literal(_)
                | Expr::Integer(_)
                | Expr::Boolean(_)
                | Expr::Null
        )
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>, parent: BinaryOp) -> fmt::Result {
        let needs_parens = match self {
            Expr::Binary { op, .. } => {
                matches!(op, BinaryOp::And | BinaryOp::Or) && *op != parent
            }
            _ => false,
        };
        if needs_parens {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{name}"),
            Expr::QualifiedColumn(table, column) => write!(f, "{table}.{column}"),
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Integer(value) => write!(f, "{value}"),
            Expr::Boolean(true) => f.write_str("TRUE"),
            Expr::Boolean(false) => f.write_str("FALSE"),
            Expr::Null => f.write_str("NULL"),
            Expr::Binary { left, op, right } => {
                left.write_operand(f, *op)?;
                write!(f, " {} ", op.as_str())?;
                right.write_operand(f, *op)
            }
            Expr::IsNull { expr, negated } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{expr} IS{not} NULL")
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{expr}{not} IN (")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(')')
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{expr}{not} IN ({subquery})")
            }
            Expr::Exists { subquery, negated } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{not}EXISTS ({subquery})")
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                f.write_str("CASE")?;
                for (when, then) in branches {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                if let Some(otherwise) = otherwise {
                    write!(f, " ELSE {otherwise}")?;
                }
                f.write_str(" END")
            }
            Expr::Cast { expr, data_type } => {
                if expr.is_atomic() {
                    write!(f, "{expr}::{data_type}")
                } else {
                    write!(f, "({expr})::{data_type}")
                }
            }
            Expr::Lower(expr) => write!(f, "LOWER({expr})"),
            Expr::Left { expr, len } => write!(f, "LEFT({expr}, {len})"),
            Expr::Substring { expr, from } => write!(f, "SUBSTRING({expr} FROM {from})"),
            Expr::Aggregate { func, arg, filter } => {
                write!(f, "{}({arg})", func.as_str())?;
                if let Some(filter) = filter {
                    write!(f, " FILTER (WHERE {filter})")?;
                }
                Ok(())
            }
        }
    }
}

/// A table in a FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: Ident,
    pub alias: Option<Ident>,
}

impl Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} {alias}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A single `SELECT` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub projection: Vec<(Expr, Option<Ident>)>,
    pub from: TableRef,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
}

impl Select {
    pub fn from(table: Ident) -> Self {
        Self {
            distinct: false,
            projection: Vec::new(),
            from: TableRef {
                name: table,
                alias: None,
            },
            selection: None,
            group_by: Vec::new(),
        }
    }

    pub fn from_aliased(table: Ident, alias: Ident) -> Self {
        let mut select = Self::from(table);
        select.from.alias = Some(alias);
        select
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn project(mut self, expr: Expr) -> Self {
        self.projection.push((expr, None));
        self
    }

    pub fn project_as(mut self, expr: Expr, alias: Ident) -> Self {
        self.projection.push((expr, Some(alias)));
        self
    }

    /// Adds a condition, AND-ed with any existing one.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.selection = Some(match self.selection.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    /// Multi-line rendering used for top-level statements.
    pub fn to_pretty_string(&self) -> String {
        let mut out = String::new();
        out.push_str(if self.distinct {
            "SELECT DISTINCT\n"
        } else {
            "SELECT\n"
        });
        for (i, (expr, alias)) in self.projection.iter().enumerate() {
            let sep = if i + 1 < self.projection.len() { "," } else { "" };
            match alias {
                Some(alias) => {
                    let _ = writeln!(out, "    {expr} AS {alias}{sep}");
                }
                None => {
                    let _ = writeln!(out, "    {expr}{sep}");
                }
            }
        }
        let _ = write!(out, "FROM {}", self.from);
        if let Some(selection) = &self.selection {
            let _ = write!(out, "\nWHERE {selection}");
        }
        if !self.group_by.is_empty() {
            out.push_str("\nGROUP BY ");
            out.push_str(&join(&self.group_by, ", "));
        }
        out
    }
}

impl Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        })?;
        for (i, (expr, alias)) in self.projection.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{expr}")?;
            if let Some(alias) = alias {
                write!(f, " AS {alias}")?;
            }
        }
        write!(f, " FROM {}", self.from)?;
        if let Some(selection) = &self.selection {
            write!(f, " WHERE {selection}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", join(&self.group_by, ", "))?;
        }
        Ok(())
    }
}

pub(crate) fn join<T: Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Ident {
        Ident::new(name).unwrap()
    }

    #[test]
    fn test_literal_escaping() {
        let lit = Literal::new("O'Brien").unwrap();
        assert_eq!(lit.to_string(), "'O''Brien'");
        assert_eq!(lit.value(), "O'Brien");
        assert!(Literal::new("a\0b").is_err());
    }

    #[test]
    fn test_derived_name_is_shortened_deterministically() {
        let long_table = "ct_".to_string() + &"very_long_table_name_".repeat(3);
        let a = Ident::derived(&["fk", &long_table, "has_object_spec"]).unwrap();
        let b = Ident::derived(&["fk", &long_table, "has_object_spec"]).unwrap();
        let c = Ident::derived(&["fk", &long_table, "has_other_spec"]).unwrap();
        assert!(a.as_str().len() <= MAX_IDENTIFIER_LENGTH);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let short = Ident::derived(&["idx", "ct_stations", "has_name"]).unwrap();
        assert_eq!(short.as_str(), "idx_ct_stations_has_name");
    }

    #[test]
    fn test_case_and_cast_rendering() {
        let obj = Expr::col(ident("obj"));
        let pred = Expr::col(ident("pred"));
        let expr = Expr::aggregate(
            AggregateFn::Max,
            Expr::case(
                vec![(
                    pred.eq(Expr::string("http://x/p").unwrap()),
                    obj.cast(SqlType::Integer),
                )],
                None,
            ),
        );
        assert_eq!(
            expr.to_string(),
            "MAX(CASE WHEN pred = 'http://x/p' THEN obj::INTEGER END)"
        );
    }

    #[test]
    fn test_filter_clause_rendering() {
        let expr = Expr::aggregate(AggregateFn::ArrayAgg, Expr::col(ident("obj")))
            .filter(Expr::col(ident("pred")).eq(Expr::string("http://x/p").unwrap()));
        assert_eq!(
            expr.to_string(),
            "ARRAY_AGG(obj) FILTER (WHERE pred = 'http://x/p')"
        );
    }

    #[test]
    fn test_precedence_parens() {
        let a = Expr::col(ident("a")).eq(Expr::Integer(1));
        let b = Expr::col(ident("b")).eq(Expr::Integer(2));
        let c = Expr::col(ident("c")).eq(Expr::Integer(3));
        let expr = a.or(b).and(c);
        assert_eq!(expr.to_string(), "(a = 1 OR b = 2) AND c = 3");
    }

    #[test]
    fn test_select_inline_and_pretty() {
        let select = Select::from(ident("rdf_triples"))
            .project(Expr::col(ident("subj")))
            .filter(Expr::col(ident("pred")).eq(Expr::string("p").unwrap()))
            .filter(Expr::col(ident("obj")).eq(Expr::string("o").unwrap()));
        assert_eq!(
            select.to_string(),
            "SELECT subj FROM rdf_triples WHERE pred = 'p' AND obj = 'o'"
        );
        let pretty = Select::from(ident("rdf_triples"))
            .project_as(Expr::col(ident("subj")), ident("rdf_subject"))
            .project(Expr::col(ident("pred")))
            .group_by(Expr::col(ident("subj")))
            .to_pretty_string();
        assert_eq!(
            pretty,
            "SELECT\n    subj AS rdf_subject,\n    pred\nFROM rdf_triples\nGROUP BY subj"
        );
    }
}
