//! Column planning: one [`TableDescriptor`] per class profile.

use tracing::{debug, info, instrument};

use crate::analyzers::{CardinalityIndex, TypeInfo};
use crate::config::PipelineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{Result, SchemaError};
use crate::foreign_keys::ForeignKeyMap;
use crate::merge::MergeConfig;
use crate::naming::{NamingPlan, TableNaming};
use crate::ontology::{OntologySource, PropertyKind};
use crate::prefixes::{PrefixSource, PrefixStrategy};
use crate::profile::{ClassProfile, PredicateUsage};
use crate::sql::{Ident, SqlType};

/// A planned column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub name: Ident,
    pub predicate_uri: String,
    pub predicate_short: String,
    pub resolved_type: SqlType,
    pub is_array: bool,
    pub is_foreign_key: bool,
    pub target_table: Option<Ident>,
    pub coverage: f64,
}

impl ColumnPlan {
    /// Column type text, `TEXT[]` style for arrays.
    pub fn rendered_type(&self) -> String {
        self.resolved_type.render(self.is_array)
    }
}

/// A class whose instances populate a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceClass {
    pub class_name: String,
    pub class_uri: String,
}

/// Everything the code generators need to know about one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub table_name: Ident,
    pub columns: Vec<ColumnPlan>,
    /// `(column, target_table)` for every reference column, arrays included
    pub foreign_keys: Vec<(Ident, Ident)>,
    pub merge_config: Option<MergeConfig>,
    pub discriminator: Option<Ident>,
    pub prefix_strategy: PrefixStrategy,
    /// Member classes in configured order; a single entry for simple tables
    pub source_classes: Vec<SourceClass>,
    pub instance_count: u64,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnPlan> {
        self.columns.iter().find(|c| c.name.as_str() == name)
    }

    pub fn is_merged(&self) -> bool {
        self.merge_config.is_some()
    }

    /// Reference columns that can carry a constraint.
    pub fn scalar_foreign_keys(&self) -> impl Iterator<Item = &ColumnPlan> {
        self.columns
            .iter()
            .filter(|c| c.is_foreign_key && !c.is_array)
    }

    pub fn array_count(&self) -> usize {
        self.columns.iter().filter(|c| c.is_array).count()
    }
}

/// Turns profiles and their analyses into [`TableDescriptor`]s.
pub struct ColumnPlanner<'a> {
    config: &'a PipelineConfig,
    type_info: &'a TypeInfo,
    cardinality: &'a CardinalityIndex,
    ontology: &'a dyn OntologySource,
    prefixes: &'a dyn PrefixSource,
}

impl<'a> ColumnPlanner<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        type_info: &'a TypeInfo,
        cardinality: &'a CardinalityIndex,
        ontology: &'a dyn OntologySource,
        prefixes: &'a dyn PrefixSource,
    ) -> Self {
        Self {
            config,
            type_info,
            cardinality,
            ontology,
            prefixes,
        }
    }

    /// Plans every profile, in order.
    #[instrument(skip_all, fields(profiles = profiles.len()))]
    pub fn plan_all(
        &self,
        profiles: &[ClassProfile],
        naming: &NamingPlan,
        foreign_keys: &ForeignKeyMap,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<TableDescriptor>> {
        let tables = profiles
            .iter()
            .enumerate()
            .map(|(index, profile)| {
                let names = naming.for_profile(index).ok_or_else(|| {
                    SchemaError::internal(format!(
                        "no table name planned for '{}'",
                        profile.class_name()
                    ))
                })?;
                self.plan(profile, names, foreign_keys, diagnostics)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            tables = tables.len(),
            columns = tables.iter().map(|t| t.columns.len()).sum::<usize>(),
            "Planned columns"
        );
        Ok(tables)
    }

    /// Plans one table.
    pub fn plan(
        &self,
        profile: &ClassProfile,
        names: &TableNaming,
        foreign_keys: &ForeignKeyMap,
        diagnostics: &mut Diagnostics,
    ) -> Result<TableDescriptor> {
        let table = &names.table;
        let member_uris = profile.source_class_uris();

        let mut columns = Vec::new();
        for usage in profile.predicates() {
            if !self.is_planned(usage) {
                continue;
            }
            let Some(name) = names.column_for(&usage.predicate_uri) else {
                continue;
            };

            let is_array = self.decide_array(table, &member_uris, usage, diagnostics);
            let target_table = foreign_keys
                .get(table, name)
                .map(|fk| fk.target_table.clone());
            let resolved_type = if target_table.is_some() {
                SqlType::Text
            } else {
                self.type_info.type_of(&usage.predicate_uri).unwrap_or_else(|| {
                    diagnostics.push(Diagnostic::MissingTypeData {
                        table: table.to_string(),
                        predicate_uri: usage.predicate_uri.clone(),
                    });
                    SqlType::Text
                })
            };

            columns.push(ColumnPlan {
                name: name.clone(),
                predicate_uri: usage.predicate_uri.clone(),
                predicate_short: usage.predicate_short.clone(),
                resolved_type,
                is_array,
                is_foreign_key: target_table.is_some(),
                target_table,
                coverage: usage.coverage_percentage,
            });
        }

        let prefixes = self.prefixes.prefixes_for_table(table.as_str());
        let prefix_strategy = PrefixStrategy::from_prefixes(&prefixes)?;
        if prefix_strategy.is_none() {
            diagnostics.push(Diagnostic::MissingPrefixData {
                table: table.to_string(),
            });
        }

        let foreign_keys = columns
            .iter()
            .filter_map(|c| Some((c.name.clone(), c.target_table.clone()?)))
            .collect();
        debug!(
            table = %table,
            columns = columns.len(),
            arrays = columns.iter().filter(|c| c.is_array).count(),
            "Planned table"
        );

        Ok(TableDescriptor {
            table_name: table.clone(),
            columns,
            foreign_keys,
            merge_config: profile.merge_config().cloned(),
            discriminator: names.discriminator.clone(),
            prefix_strategy,
            source_classes: profile
                .source_classes()
                .into_iter()
                .map(|(name, uri)| SourceClass {
                    class_name: name.to_string(),
                    class_uri: uri.to_string(),
                })
                .collect(),
            instance_count: profile.instance_count(),
        })
    }

    fn is_planned(&self, usage: &PredicateUsage) -> bool {
        usage.predicate_uri != self.config.rdf_type_uri
            && usage.coverage_percentage >= self.config.min_coverage
            && !self.config.is_excluded_namespace(&usage.namespace)
    }

    /// Functional predicates are always scalar. Others become arrays when some
    /// member class has a subject with more than one value.
    fn decide_array(
        &self,
        table: &Ident,
        member_uris: &[&str],
        usage: &PredicateUsage,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        if self.ontology.classify(&usage.predicate_uri) == PropertyKind::Functional {
            return false;
        }
        match self
            .cardinality
            .max_values_across(member_uris.iter().copied(), &usage.predicate_uri)
        {
            Some(max_values) => max_values > 1,
            None => {
                diagnostics.push(Diagnostic::MissingCardinalityData {
                    table: table.to_string(),
                    predicate_uri: usage.predicate_uri.clone(),
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::analyzers::{
        CardinalityStats, ClassCardinality, InferenceBasis, PredicateTypeInfo, TypeDetails,
    };
    use crate::foreign_keys::ForeignKeyResolver;
    use crate::merge::ClassMerger;
    use crate::ontology::OntologyProperties;
    use crate::prefixes::PrefixMap;
    use crate::profile::{EdgePredicate, ProfileData, ReferenceEdge};

    const CPMETA: &str = "http://meta.icos-cp.eu/ontologies/cpmeta/";

    fn uri(local: &str) -> String {
        format!("{CPMETA}{local}")
    }

    fn usage(local: &str, coverage: f64) -> PredicateUsage {
        PredicateUsage {
            predicate_uri: uri(local),
            predicate_short: format!("cpmeta:{local}"),
            namespace: "cpmeta".into(),
            usage_count: 1,
            coverage_percentage: coverage,
        }
    }

    fn data(name: &str, predicates: Vec<PredicateUsage>) -> ProfileData {
        ProfileData {
            class_uri: uri(name),
            class_name: format!("cpmeta:{name}"),
            instance_count: 1000,
            predicates,
            references_to: vec![],
            referenced_by: vec![],
        }
    }

    fn type_info(entries: &[(&str, SqlType)]) -> TypeInfo {
        let mut info = TypeInfo::default();
        for (local, sql_type) in entries {
            info.insert(
                uri(local),
                PredicateTypeInfo {
                    postgresql_type: *sql_type,
                    samples_analyzed: 3,
                    inference_basis: InferenceBasis::AllSamplesAreIntegers,
                    details: TypeDetails::default(),
                },
            );
        }
        info
    }

    fn cardinality(entries: Vec<(&str, &str, Vec<u64>)>) -> CardinalityIndex {
        let mut index = CardinalityIndex::default();
        for (class, predicate, counts) in entries {
            let class_uri = uri(class);
            let mut class_entry = index
                .classes
                .remove(&class_uri)
                .unwrap_or_else(|| ClassCardinality {
                    class_name: format!("cpmeta:{class}"),
                    instance_count: counts.len() as u64,
                    predicates: BTreeMap::new(),
                });
            class_entry.predicates.insert(
                uri(predicate),
                CardinalityStats::from_counts(&counts).unwrap(),
            );
            index.insert(class_uri, class_entry);
        }
        index
    }

    struct Fixture {
        config: PipelineConfig,
        types: TypeInfo,
        cardinality: CardinalityIndex,
        ontology: OntologyProperties,
        prefixes: PrefixMap,
    }

    impl Fixture {
        fn plan(&self, profiles: &[ClassProfile]) -> (Vec<TableDescriptor>, Diagnostics) {
            let naming = NamingPlan::build(profiles, &self.config.rdf_type_uri).unwrap();
            let mut diagnostics = Diagnostics::new();
            let fks = ForeignKeyResolver.resolve(profiles, &naming, &mut diagnostics);
            let planner = ColumnPlanner::new(
                &self.config,
                &self.types,
                &self.cardinality,
                &self.ontology,
                &self.prefixes,
            );
            let tables = planner
                .plan_all(profiles, &naming, &fks, &mut diagnostics)
                .unwrap();
            (tables, diagnostics)
        }
    }

    fn fixture() -> Fixture {
        Fixture {
            config: PipelineConfig::default(),
            types: TypeInfo::default(),
            cardinality: CardinalityIndex::default(),
            ontology: OntologyProperties::default(),
            prefixes: PrefixMap::default(),
        }
    }

    #[test]
    fn test_functional_integer_is_scalar() {
        let mut f = fixture();
        f.types = type_info(&[("hasNumberOfRows", SqlType::SmallInt)]);
        f.ontology = OntologyProperties::new([uri("hasNumberOfRows")], Vec::<String>::new());
        // Observed data says multi-valued; the ontology wins.
        f.cardinality = cardinality(vec![("DataObject", "hasNumberOfRows", vec![1, 2])]);

        let profiles = vec![ClassProfile::Simple(data(
            "DataObject",
            vec![usage("hasNumberOfRows", 100.0)],
        ))];
        let (tables, _) = f.plan(&profiles);
        let column = tables[0].column("has_number_of_rows").unwrap();
        assert!(column.resolved_type.is_integer());
        assert!(!column.is_array);
    }

    #[test]
    fn test_sparse_multi_values_make_array() {
        let mut f = fixture();
        let mut counts = vec![1u64; 980];
        counts.extend([3u64; 20]);
        f.cardinality = cardinality(vec![("Station", "hasKeyword", counts)]);
        f.ontology = OntologyProperties::new(Vec::<String>::new(), [uri("hasKeyword")]);
        f.types = type_info(&[("hasKeyword", SqlType::Text)]);

        let profiles = vec![ClassProfile::Simple(data(
            "Station",
            vec![usage("hasKeyword", 100.0)],
        ))];
        let (tables, diagnostics) = f.plan(&profiles);
        let column = tables[0].column("has_keyword").unwrap();
        assert!(column.is_array);
        assert_eq!(column.rendered_type(), "TEXT[]");
        assert_eq!(diagnostics.count_of("missing_cardinality_data"), 0);
    }

    #[test]
    fn test_missing_data_defaults() {
        let f = fixture();
        let profiles = vec![ClassProfile::Simple(data(
            "Station",
            vec![usage("hasName", 100.0)],
        ))];
        let (tables, diagnostics) = f.plan(&profiles);
        let column = tables[0].column("has_name").unwrap();
        assert_eq!(column.resolved_type, SqlType::Text);
        assert!(!column.is_array);
        assert_eq!(diagnostics.count_of("missing_type_data"), 1);
        assert_eq!(diagnostics.count_of("missing_cardinality_data"), 1);
        assert_eq!(diagnostics.count_of("missing_prefix_data"), 1);
        assert!(tables[0].prefix_strategy.is_none());
    }

    #[test]
    fn test_skips_type_predicate_low_coverage_and_excluded_namespaces() {
        let mut f = fixture();
        f.config = PipelineConfig::builder()
            .min_coverage(10.0)
            .exclude_namespace("prov")
            .build()
            .unwrap();
        let mut prov = usage("hasActivity", 100.0);
        prov.predicate_uri = "http://www.w3.org/ns/prov#hasActivity".into();
        prov.predicate_short = "prov:hasActivity".into();
        prov.namespace = "prov".into();
        let mut rdf_type = usage("type", 100.0);
        rdf_type.predicate_uri = f.config.rdf_type_uri.clone();
        rdf_type.predicate_short = "rdf:type".into();
        rdf_type.namespace = "rdf".into();

        let profiles = vec![ClassProfile::Simple(data(
            "Station",
            vec![rdf_type, usage("hasName", 100.0), usage("hasRare", 5.0), prov],
        ))];
        let (tables, _) = f.plan(&profiles);
        let names: Vec<&str> = tables[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["has_name"]);
    }

    #[test]
    fn test_merged_array_decision_uses_all_members() {
        let mut f = fixture();
        // Only AS instances carry several values.
        f.cardinality = cardinality(vec![
            ("Station", "hasPi", vec![1, 1]),
            ("AS", "hasPi", vec![1, 2]),
        ]);
        let profiles = ClassMerger::default().merge(&[
            data("Station", vec![usage("hasPi", 100.0)]),
            data("AS", vec![usage("hasPi", 100.0)]),
        ]);
        let (tables, _) = f.plan(&profiles);
        let table = &tables[0];
        assert_eq!(table.table_name.as_str(), "ct_stations");
        assert!(table.is_merged());
        assert_eq!(table.discriminator.as_ref().unwrap().as_str(), "station_type");
        assert!(table.column("has_pi").unwrap().is_array);
        assert_eq!(table.source_classes.len(), 2);
    }

    #[test]
    fn test_foreign_keys_forced_to_text() {
        let mut f = fixture();
        f.types = type_info(&[("hasSpec", SqlType::Integer)]);
        f.prefixes.insert("ct_specs", "http://x/spec/", 2);
        let mut object = data("DataObject", vec![usage("hasSpec", 100.0)]);
        object.references_to = vec![ReferenceEdge {
            target_class_uri: uri("Spec"),
            target_class_name: "cpmeta:Spec".into(),
            reference_count: 4,
            predicates: vec![EdgePredicate {
                predicate_uri: uri("hasSpec"),
                predicate_short: "cpmeta:hasSpec".into(),
                count: 4,
            }],
        }];
        let profiles = vec![
            ClassProfile::Simple(object),
            ClassProfile::Simple(data("Spec", vec![])),
        ];
        let (tables, _) = f.plan(&profiles);
        let column = tables[0].column("has_spec").unwrap();
        assert!(column.is_foreign_key);
        assert_eq!(column.resolved_type, SqlType::Text);
        assert_eq!(column.target_table.as_ref().unwrap().as_str(), "ct_specs");
        assert_eq!(tables[0].scalar_foreign_keys().count(), 1);
        assert!(matches!(tables[1].prefix_strategy, PrefixStrategy::Single(_)));
    }
}
