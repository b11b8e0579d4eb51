//! Identifier and literal validation for generated SQL.
//!
//! Table and column names are derived from class and predicate URIs, which are
//! data, not code. Every name passes through [`SqlSecurity::validate_identifier`]
//! before the SQL builder accepts it, and every string value passes through
//! [`SqlSecurity::quote_literal`].

use crate::error::{Result, SchemaError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Longest identifier PostgreSQL keeps without truncation.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Words that cannot be used as bare identifiers in generated SQL.
pub static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "all", "and", "any", "array", "as", "asc", "both", "case", "cast", "check", "collate",
        "column", "constraint", "create", "default", "delete", "desc", "distinct", "do", "drop",
        "else", "end", "except", "false", "fetch", "for", "foreign", "from", "grant", "group",
        "having", "in", "insert", "intersect", "into", "leading", "limit", "not", "null",
        "offset", "on", "only", "or", "order", "primary", "references", "returning", "select",
        "table", "then", "to", "trailing", "true", "type", "union", "unique", "update", "user",
        "using", "when", "where", "window", "with",
    ]
    .into_iter()
    .collect()
});

/// SQL identifier validation and escaping utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates a bare SQL identifier (table name, column name, constraint name).
    ///
    /// Accepted identifiers are lowercase, start with a letter or underscore, contain
    /// only `[a-z0-9_]`, fit in [`MAX_IDENTIFIER_LENGTH`] bytes and are not reserved
    /// words. Such identifiers are safe to emit unquoted.
    ///
    /// # Examples
    /// ```rust
    /// use triple_schema::security::SqlSecurity;
    ///
    /// assert!(SqlSecurity::validate_identifier("ct_stations").is_ok());
    /// assert!(SqlSecurity::validate_identifier("select").is_err());
    /// assert!(SqlSecurity::validate_identifier("id; DROP TABLE x--").is_err());
    /// ```
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(SchemaError::InvalidIdentifier(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > MAX_IDENTIFIER_LENGTH {
            return Err(SchemaError::InvalidIdentifier(format!(
                "'{identifier}' is too long (max {MAX_IDENTIFIER_LENGTH} bytes)"
            )));
        }

        static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
            // This regex is compile-time constant and known to be valid
            #[allow(clippy::expect_used)]
            Regex::new(r"^[a-z_][a-z0-9_]*$").expect("Hard-coded regex pattern should be valid")
        });

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(SchemaError::InvalidIdentifier(format!(
                "'{identifier}' must start with a lowercase letter or underscore and contain only lowercase letters, digits and underscores"
            )));
        }

        if RESERVED_WORDS.contains(identifier) {
            return Err(SchemaError::InvalidIdentifier(format!(
                "'{identifier}' is a reserved word"
            )));
        }

        Ok(())
    }

    /// Validates a possibly schema-qualified table name such as `public.rdf_triples`.
    pub fn validate_qualified_name(name: &str) -> Result<()> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() > 2 {
            return Err(SchemaError::InvalidIdentifier(format!(
                "'{name}' has too many qualifiers"
            )));
        }
        parts
            .iter()
            .try_for_each(|part| Self::validate_identifier(part))
    }

    /// Quotes a string as a SQL literal, doubling embedded single quotes.
    ///
    /// NUL bytes cannot be stored in PostgreSQL text and are rejected.
    pub fn quote_literal(value: &str) -> Result<String> {
        if value.contains('\0') {
            return Err(SchemaError::InvalidIdentifier(
                "SQL literal cannot contain null bytes".to_string(),
            ));
        }
        Ok(format!("'{}'", value.replace('\'', "''")))
    }
}

/// Input validation utilities for numeric configuration values.
pub struct InputValidator;

impl InputValidator {
    /// Validates a numeric threshold value.
    pub fn validate_threshold(value: f64, name: &str) -> Result<()> {
        if !value.is_finite() {
            return Err(SchemaError::configuration(format!(
                "Invalid {name} value: must be finite (not NaN or infinite)"
            )));
        }
        Ok(())
    }

    /// Validates a percentage value (0.0 to 100.0).
    pub fn validate_percentage(value: f64, name: &str) -> Result<()> {
        Self::validate_threshold(value, name)?;

        if !(0.0..=100.0).contains(&value) {
            return Err(SchemaError::configuration(format!(
                "Invalid {name} value: must be between 0 and 100, got {value}"
            )));
        }
        Ok(())
    }
}
