//! Error types for the triple-schema pipeline.
//!
//! All fatal conditions are represented by [`SchemaError`]. Data-completeness
//! problems that the pipeline can recover from (missing type data, missing
//! cardinality data, ambiguous foreign keys, missing prefix data) are not errors;
//! they are recorded as [`Diagnostic`](crate::diagnostics::Diagnostic)s instead.

use thiserror::Error;

/// The main error type for the triple-schema library.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The ontology property file could not be found or read.
    #[error("Ontology file not found: {path}")]
    MissingOntologyFile {
        /// Path that was looked up
        path: String,
    },

    /// Two distinct predicates sanitize to the same column name in one table.
    #[error("Column name collision in table '{table}': '{column}' is produced by both <{first_predicate}> and <{second_predicate}>")]
    ColumnNameCollision {
        table: String,
        column: String,
        first_predicate: String,
        second_predicate: String,
    },

    /// Two distinct classes sanitize to the same table name.
    #[error("Table name collision: '{table}' is produced by both '{first_class}' and '{second_class}'")]
    TableNameCollision {
        table: String,
        first_class: String,
        second_class: String,
    },

    /// An identifier failed validation before being placed into SQL.
    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error when parsing input documents.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// A read against the triple store failed.
    #[error("Triple store query failed: {message}")]
    StoreQuery {
        /// Detailed error message
        message: String,
        /// Whether retrying the same read may succeed
        retryable: bool,
    },

    /// The run was cancelled through its [`CancelToken`](crate::store::CancelToken).
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// A statement failed while executing a phase; the phase was rolled back.
    #[error("Phase '{phase}' failed at statement {statement_index}: {message}")]
    PhaseFailed {
        phase: String,
        statement_index: usize,
        message: String,
    },

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, SchemaError>`.
pub type Result<T> = std::result::Result<T, SchemaError>;

impl SchemaError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a store query error that may be retried.
    pub fn store_query(msg: impl Into<String>) -> Self {
        Self::StoreQuery {
            message: msg.into(),
            retryable: true,
        }
    }

    /// Creates a store query error that must not be retried.
    pub fn store_query_fatal(msg: impl Into<String>) -> Self {
        Self::StoreQuery {
            message: msg.into(),
            retryable: false,
        }
    }

    /// Creates an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for failures of idempotent reads that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreQuery { retryable, .. } => *retryable,
            Self::DataFusion(e) => matches!(
                e,
                datafusion::error::DataFusionError::IoError(_)
                    | datafusion::error::DataFusionError::ResourcesExhausted(_)
            ),
            Self::Io(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<SchemaError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| wrap(msg, e.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(&f(), e.into()))
    }
}

fn wrap(msg: &str, err: SchemaError) -> SchemaError {
    match err {
        // Keep variants callers match on.
        SchemaError::MissingOntologyFile { .. }
        | SchemaError::ColumnNameCollision { .. }
        | SchemaError::TableNameCollision { .. }
        | SchemaError::Cancelled(_)
        | SchemaError::PhaseFailed { .. } => err,
        SchemaError::StoreQuery { message, retryable } => SchemaError::StoreQuery {
            message: format!("{msg}: {message}"),
            retryable,
        },
        SchemaError::Internal(inner) => SchemaError::Internal(format!("{msg}: {inner}")),
        other => SchemaError::Internal(format!("{msg}: {other}")),
    }
}
