//! End-to-end schema build.
//!
//! ```text
//! profile ─┬─ infer types ──────┐
//!          └─ cardinality ──────┤
//! merge ── name ── resolve FKs ── plan columns ── generate SQL
//! ```
//!
//! [`SchemaPipeline::run`] reads everything from a [`TripleStore`];
//! [`SchemaPipeline::build`] starts from analyses computed earlier.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::analyzers::{CardinalityAnalyzer, CardinalityIndex, TypeInferencer, TypeInfo};
use crate::codegen::CodeGenerator;
use crate::config::PipelineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{ErrorContext, Result};
use crate::executor::{PhaseExecutor, PhaseReport, SqlExecutor};
use crate::foreign_keys::ForeignKeyResolver;
use crate::merge::ClassMerger;
use crate::naming::NamingPlan;
use crate::ontology::OntologySource;
use crate::planner::{ColumnPlanner, TableDescriptor};
use crate::prefixes::{PrefixSource, PrefixStrategy};
use crate::profile::{ClassProfiler, ProfileData};
use crate::sql::{Phase, SqlDocuments};
use crate::store::{CancelToken, ReadContext, TripleStore};

/// Summary of one generated table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub source_classes: Vec<String>,
    pub instance_count: u64,
    pub columns: usize,
    pub array_columns: usize,
    pub foreign_keys: usize,
    pub constrained_foreign_keys: usize,
    /// `none`, `single` or `multi`
    pub prefix_strategy: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
}

/// What a build produced, for review.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub generated_at: String,
    /// SHA-256 over profiles, analyses, ontology sets, prefixes and config
    pub input_fingerprint: String,
    pub tables: Vec<TableSummary>,
    pub statements: Vec<(Phase, usize)>,
    pub diagnostics: Diagnostics,
}

impl BuildReport {
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn merged_tables(&self) -> impl Iterator<Item = &TableSummary> {
        self.tables.iter().filter(|t| t.discriminator.is_some())
    }
}

/// Output of a build.
#[derive(Debug, Clone)]
pub struct SchemaBuild {
    pub tables: Vec<TableDescriptor>,
    pub documents: SqlDocuments,
    pub report: BuildReport,
}

impl SchemaBuild {
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.table_name.as_str() == name)
    }

    /// Writes the four SQL documents and `build_report.json` into `dir`.
    pub async fn write_artifacts(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let mut written = self.documents.write_to_dir(dir).await?;
        let path = dir.join("build_report.json");
        tokio::fs::write(&path, self.report.to_json_string()?)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
        Ok(written)
    }
}

/// Runs the schema build.
pub struct SchemaPipeline<'a> {
    config: PipelineConfig,
    ontology: &'a dyn OntologySource,
    prefixes: &'a dyn PrefixSource,
    merger: ClassMerger,
    cancel: CancelToken,
}

impl<'a> SchemaPipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        ontology: &'a dyn OntologySource,
        prefixes: &'a dyn PrefixSource,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ontology,
            prefixes,
            merger: ClassMerger::default(),
            cancel: CancelToken::new(),
        })
    }

    /// Replaces the compiled-in merge groups.
    pub fn with_merger(mut self, merger: ClassMerger) -> Self {
        self.merger = merger;
        self
    }

    /// Token observed by every store read and every executed statement.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Profiles the store, analyzes it, and builds the schema.
    #[instrument(skip_all)]
    pub async fn run(&self, store: &dyn TripleStore) -> Result<SchemaBuild> {
        let ctx = ReadContext::new(self.cancel.clone(), self.config.retry.clone());

        let profiles = ClassProfiler::new(store, &ctx).profile_all().await?;
        let type_info = TypeInferencer::new()
            .sample_size(self.config.sample_size)
            .deterministic(self.config.deterministic_sampling)
            .infer_all(
                store,
                &ctx,
                profiles
                    .iter()
                    .flat_map(|p| &p.predicates)
                    .map(|p| p.predicate_uri.as_str())
                    .filter(|uri| *uri != self.config.rdf_type_uri),
            )
            .await?;
        // Per original class, so union tables can take the max over members.
        let cardinality = CardinalityAnalyzer::new(self.config.rdf_type_uri.as_str())
            .analyze_profiles(store, &ctx, &profiles)
            .await?;

        self.cancel.check("schema build")?;
        self.build(&profiles, &type_info, &cardinality)
    }

    /// Builds the schema from profiles and analyses.
    #[instrument(skip_all, fields(classes = profiles.len()))]
    pub fn build(
        &self,
        profiles: &[ProfileData],
        type_info: &TypeInfo,
        cardinality: &CardinalityIndex,
    ) -> Result<SchemaBuild> {
        let mut diagnostics = Diagnostics::new();

        let merged = self.merger.merge(profiles);
        let naming = NamingPlan::build(&merged, &self.config.rdf_type_uri)?;
        let foreign_keys = ForeignKeyResolver.resolve(&merged, &naming, &mut diagnostics);
        let tables = ColumnPlanner::new(
            &self.config,
            type_info,
            cardinality,
            self.ontology,
            self.prefixes,
        )
        .plan_all(&merged, &naming, &foreign_keys, &mut diagnostics)?;
        let documents = CodeGenerator::new(&self.config).generate(&tables)?;

        let report = BuildReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            input_fingerprint: self.fingerprint(profiles, type_info, cardinality, &tables)?,
            tables: tables.iter().map(summarize).collect(),
            statements: documents
                .in_order()
                .map(|doc| (doc.phase, doc.len()))
                .collect(),
            diagnostics,
        };
        info!(
            tables = report.tables.len(),
            statements = documents.total_statements(),
            diagnostics = report.diagnostics.len(),
            fingerprint = %report.input_fingerprint,
            "Schema build complete"
        );
        Ok(SchemaBuild {
            tables,
            documents,
            report,
        })
    }

    /// Applies a build's documents phase by phase.
    pub async fn apply(
        &self,
        build: &SchemaBuild,
        executor: &dyn SqlExecutor,
    ) -> Result<Vec<PhaseReport>> {
        PhaseExecutor::new(executor, self.cancel.clone())
            .run(&build.documents)
            .await
    }

    fn fingerprint(
        &self,
        profiles: &[ProfileData],
        type_info: &TypeInfo,
        cardinality: &CardinalityIndex,
        tables: &[TableDescriptor],
    ) -> Result<String> {
        // Metadata (timestamps) is left out so identical inputs hash identically.
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(profiles)?);
        hasher.update(serde_json::to_vec(&type_info.types)?);
        hasher.update(serde_json::to_vec(&cardinality.classes)?);
        hasher.update(serde_json::to_vec(self.ontology.functional_properties())?);
        hasher.update(serde_json::to_vec(self.ontology.non_functional_properties())?);
        for table in tables {
            hasher.update(table.table_name.as_str());
            for prefix in table.prefix_strategy.prefixes() {
                hasher.update(prefix);
            }
        }
        hasher.update(serde_json::to_vec(&self.config)?);
        Ok(hex::encode(hasher.finalize()))
    }
}

fn summarize(table: &TableDescriptor) -> TableSummary {
    TableSummary {
        table: table.table_name.to_string(),
        source_classes: table
            .source_classes
            .iter()
            .map(|c| c.class_name.clone())
            .collect(),
        instance_count: table.instance_count,
        columns: table.columns.len(),
        array_columns: table.array_count(),
        foreign_keys: table.foreign_keys.len(),
        constrained_foreign_keys: table.scalar_foreign_keys().count(),
        prefix_strategy: match table.prefix_strategy {
            PrefixStrategy::None => "none",
            PrefixStrategy::Single(_) => "single",
            PrefixStrategy::Multi(_) => "multi",
        },
        discriminator: table.discriminator.as_ref().map(ToString::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::OntologyProperties;
    use crate::prefixes::PrefixMap;
    use crate::profile::PredicateUsage;

    fn profile(name: &str) -> ProfileData {
        ProfileData {
            class_uri: format!("http://meta.icos-cp.eu/ontologies/cpmeta/{name}"),
            class_name: format!("cpmeta:{name}"),
            instance_count: 2,
            predicates: vec![PredicateUsage {
                predicate_uri: "http://meta.icos-cp.eu/ontologies/cpmeta/hasName".into(),
                predicate_short: "cpmeta:hasName".into(),
                namespace: "cpmeta".into(),
                usage_count: 2,
                coverage_percentage: 100.0,
            }],
            references_to: vec![],
            referenced_by: vec![],
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let ontology = OntologyProperties::default();
        let prefixes = PrefixMap::default();
        let pipeline =
            SchemaPipeline::new(PipelineConfig::default(), &ontology, &prefixes).unwrap();
        let profiles = vec![profile("Station"), profile("DataObject")];
        let types = TypeInfo::default();
        let cardinality = CardinalityIndex::default();

        let first = pipeline.build(&profiles, &types, &cardinality).unwrap();
        let second = pipeline.build(&profiles, &types, &cardinality).unwrap();
        assert_eq!(
            first.report.input_fingerprint,
            second.report.input_fingerprint
        );
        assert_eq!(first.documents, second.documents);

        let other = pipeline
            .build(&[profile("Station")], &types, &cardinality)
            .unwrap();
        assert_ne!(
            first.report.input_fingerprint,
            other.report.input_fingerprint
        );
    }

    #[test]
    fn test_report_summaries() {
        let ontology = OntologyProperties::default();
        let prefixes = PrefixMap::default();
        let pipeline =
            SchemaPipeline::new(PipelineConfig::default(), &ontology, &prefixes).unwrap();
        let build = pipeline
            .build(
                &[profile("Station"), profile("AS"), profile("DataObject")],
                &TypeInfo::default(),
                &CardinalityIndex::default(),
            )
            .unwrap();
        let merged: Vec<&TableSummary> = build.report.merged_tables().collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].table, "ct_stations");
        assert_eq!(merged[0].source_classes, vec!["cpmeta:Station", "cpmeta:AS"]);
        assert_eq!(build.report.statements.len(), 4);
        // one missing-prefix finding per table, type and cardinality per column
        assert_eq!(build.report.diagnostics.count_of("missing_prefix_data"), 2);
        assert!(build.report.to_json_string().unwrap().contains("\"kind\": \"missing_type_data\""));
    }

    #[tokio::test]
    async fn test_write_artifacts() {
        let ontology = OntologyProperties::default();
        let prefixes = PrefixMap::default();
        let pipeline =
            SchemaPipeline::new(PipelineConfig::default(), &ontology, &prefixes).unwrap();
        let build = pipeline
            .build(
                &[profile("Station")],
                &TypeInfo::default(),
                &CardinalityIndex::default(),
            )
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let written = build.write_artifacts(dir.path()).await.unwrap();
        assert_eq!(written.len(), 5);
        assert!(dir.path().join("build_report.json").exists());
        assert!(dir.path().join("populate.sql").exists());
    }
}
