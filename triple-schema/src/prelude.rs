//! Prelude for commonly used types and traits in triple-schema.

pub use crate::analyzers::{CardinalityIndex, TypeInfo};
pub use crate::config::{PipelineConfig, RetryConfig, StoreConfig};
pub use crate::diagnostics::{Diagnostic, Diagnostics};
pub use crate::error::{ErrorContext, Result, SchemaError};
pub use crate::executor::{PhaseExecutor, RecordingExecutor, SqlExecutor};
pub use crate::logging::LogConfig;
pub use crate::merge::{ClassMerger, MergeConfig};
pub use crate::namespaces::RDF_TYPE;
pub use crate::ontology::{OntologyProperties, OntologySource};
pub use crate::pipeline::{BuildReport, SchemaBuild, SchemaPipeline};
pub use crate::prefixes::{PrefixMap, PrefixSource};
pub use crate::profile::{ClassProfileStore, ProfileData};
pub use crate::sql::{Phase, SqlDocuments};
pub use crate::store::{CancelToken, DataFusionTripleStore, TripleStore};
