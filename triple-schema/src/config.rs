//! Pipeline configuration.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorContext, Result, SchemaError};
use crate::namespaces::RDF_TYPE;
use crate::security::{InputValidator, SqlSecurity};

/// Retry policy for idempotent triple store reads.
///
/// Writes (DDL/DML execution) are never retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// A policy that tries once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

/// Session tuning for the in-process DataFusion triple store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub batch_size: usize,
    pub target_partitions: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            target_partitions: num_cpus::get().max(1),
        }
    }
}

/// Configuration of one schema build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Table holding `(subj, pred, obj)` rows, optionally schema-qualified
    pub triples_table: String,
    pub rdf_type_uri: String,
    /// Predicates below this coverage percentage get no column
    pub min_coverage: f64,
    /// Namespace prefixes (e.g. `rdfs`) whose predicates get no column
    pub exclude_namespaces: BTreeSet<String>,
    /// Values sampled per predicate for type inference
    pub sample_size: usize,
    /// Order samples by (subject, object) instead of taking the first rows returned
    pub deterministic_sampling: bool,
    /// Emit `DROP TABLE IF EXISTS` before each `CREATE TABLE`
    pub drop_existing: bool,
    /// Scalar columns at or above this coverage are indexed
    pub index_coverage_threshold: f64,
    /// Insert stub rows for referenced URIs missing from FK targets
    pub create_reference_stubs: bool,
    pub retry: RetryConfig,
    pub store: StoreConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            triples_table: "rdf_triples".to_string(),
            rdf_type_uri: RDF_TYPE.to_string(),
            min_coverage: 0.0,
            exclude_namespaces: BTreeSet::new(),
            sample_size: 100,
            deterministic_sampling: true,
            drop_existing: true,
            index_coverage_threshold: 90.0,
            create_reference_stubs: true,
            retry: RetryConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Loads and validates a JSON config file. Missing fields take defaults.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        SqlSecurity::validate_qualified_name(&self.triples_table)?;
        InputValidator::validate_percentage(self.min_coverage, "min_coverage")?;
        InputValidator::validate_percentage(
            self.index_coverage_threshold,
            "index_coverage_threshold",
        )?;
        if self.sample_size == 0 {
            return Err(SchemaError::configuration("sample_size must be positive"));
        }
        if self.rdf_type_uri.is_empty() {
            return Err(SchemaError::configuration("rdf_type_uri cannot be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(SchemaError::configuration(
                "retry.max_attempts must be at least 1",
            ));
        }
        if self.store.batch_size == 0 || self.store.target_partitions == 0 {
            return Err(SchemaError::configuration(
                "store batch_size and target_partitions must be positive",
            ));
        }
        Ok(())
    }

    pub fn is_excluded_namespace(&self, namespace: &str) -> bool {
        self.exclude_namespaces.contains(namespace)
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn triples_table(mut self, table: impl Into<String>) -> Self {
        self.config.triples_table = table.into();
        self
    }

    pub fn rdf_type_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.rdf_type_uri = uri.into();
        self
    }

    pub fn min_coverage(mut self, pct: f64) -> Self {
        self.config.min_coverage = pct;
        self
    }

    pub fn exclude_namespace(mut self, prefix: impl Into<String>) -> Self {
        self.config.exclude_namespaces.insert(prefix.into());
        self
    }

    pub fn sample_size(mut self, size: usize) -> Self {
        self.config.sample_size = size;
        self
    }

    pub fn deterministic_sampling(mut self, enabled: bool) -> Self {
        self.config.deterministic_sampling = enabled;
        self
    }

    pub fn drop_existing(mut self, enabled: bool) -> Self {
        self.config.drop_existing = enabled;
        self
    }

    pub fn index_coverage_threshold(mut self, pct: f64) -> Self {
        self.config.index_coverage_threshold = pct;
        self
    }

    pub fn create_reference_stubs(mut self, enabled: bool) -> Self {
        self.config.create_reference_stubs = enabled;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Validates and returns the config.
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
